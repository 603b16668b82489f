//! Filesystem facts about resolved paths

use std::{fs, path::Path};

use path_clean::PathClean as _;

use crate::report::{Tag, TagError};

const ROOT: &str = "path-info";

/// Tag a path with what the local filesystem knows about it
///
/// Only the lexical normalization is done for relative paths, since they are relative to an
/// unknown directory.
pub(crate) fn tags(path: &str) -> Result<Vec<Tag>, TagError> {
    let p = Path::new(path);
    let mut tags = Vec::with_capacity(3);
    if p.is_absolute() {
        let exists = p.exists();
        tags.push(Tag::new(&[ROOT, "exists"], &exists.to_string())?);
        if exists {
            match fs::canonicalize(p) {
                Ok(canonical) => tags.push(Tag::new(
                    &[ROOT, "canonical-path"],
                    &canonical.to_string_lossy(),
                )?),
                Err(e) => tags.push(Tag::new(&[ROOT, "canonical-path-error"], &e.to_string())?),
            }
        }
    }
    tags.push(Tag::new(
        &[ROOT, "normalized-path"],
        &p.to_path_buf().clean().to_string_lossy(),
    )?);
    Ok(tags)
}
