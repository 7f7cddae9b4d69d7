use crate::utils::error::{Result, VtreeError};
use std::path::{Component, Path, PathBuf};

/// Joins an untrusted archive entry name onto `root` and verifies the result
/// stays inside `root`.
///
/// Entry names come straight out of attacker-controlled containers, so this
/// runs for every entry (directories included) before anything touches the
/// filesystem. Absolute names, drive/volume prefixes and any `..` step are
/// rejected with [`VtreeError::Traversal`]; a crafted archive may interleave
/// safe and malicious entries, so rejection must abort the whole job rather
/// than skip the entry.
pub fn resolve(root: &Path, raw_entry_name: &str) -> Result<PathBuf> {
    // Windows-built archives use backslash separators.
    let normalized = raw_entry_name.replace('\\', "/");

    let mut clean = PathBuf::new();
    for comp in Path::new(&normalized).components() {
        match comp {
            Component::Normal(v) => clean.push(v),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(traversal(root, raw_entry_name));
            }
        }
    }

    let resolved = root.join(clean);
    if resolved == root || resolved.starts_with(root) {
        Ok(resolved)
    } else {
        Err(traversal(root, raw_entry_name))
    }
}

fn traversal(root: &Path, entry: &str) -> VtreeError {
    VtreeError::Traversal {
        root: root.to_path_buf(),
        entry: entry.to_string(),
    }
}
