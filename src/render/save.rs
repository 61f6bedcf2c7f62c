use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::error::RenderError;

/// Paths tried in order when writing `target`: the target itself,
/// `<stem>-alt.<ext>` next to it, then the bare file name in the working
/// directory.
pub fn candidates(target: &Path) -> Vec<PathBuf> {
    let mut out = vec![target.to_path_buf()];
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chart".to_string());
    let alt_name = match target.extension() {
        Some(ext) => format!("{stem}-alt.{}", ext.to_string_lossy()),
        None => format!("{stem}-alt"),
    };
    out.push(target.with_file_name(alt_name));
    if let Some(name) = target.file_name() {
        let local = PathBuf::from(name);
        if !out.contains(&local) {
            out.push(local);
        }
    }
    out
}

/// Write `bytes` to `target`, falling back through [`candidates`]. Returns
/// the path actually written.
pub fn save_with_fallback(target: &Path, bytes: &[u8]) -> Result<PathBuf, RenderError> {
    let mut last_err: Option<io::Error> = None;
    for (i, path) in candidates(target).into_iter().enumerate() {
        match write_file(&path, bytes) {
            Ok(()) => {
                if i > 0 {
                    warn!(
                        "could not write {}, saved to {} instead",
                        target.display(),
                        path.display()
                    );
                }
                info!("saved {}", path.display());
                return Ok(path);
            }
            Err(e) => {
                warn!("failed to write {}: {e}", path.display());
                last_err = Some(e);
            }
        }
    }
    Err(RenderError::Save {
        path: target.to_path_buf(),
        source: last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no candidate path")),
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
