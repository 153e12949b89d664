// Native directory picker

use camino::{Utf8Path, Utf8PathBuf};

/// Show a native directory picker
///
/// Uses the `rfd` crate to display the platform folder dialog.
///
/// # Arguments
/// * `title` - Dialog title
/// * `default_dir` - Directory the dialog opens in, if it exists
///
/// # Returns
/// The selected directory, or None if cancelled or not valid UTF-8
pub fn browse_directory(title: &str, default_dir: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
    use rfd::FileDialog;

    let mut dialog = FileDialog::new().set_title(title);

    if let Some(dir) = default_dir.filter(|dir| dir.is_dir()) {
        dialog = dialog.set_directory(dir);
    }

    dialog.pick_folder().and_then(|path| {
        Utf8PathBuf::from_path_buf(path)
            .map_err(|path| {
                tracing::warn!("Selected directory is not valid UTF-8: {}", path.display());
            })
            .ok()
    })
}
