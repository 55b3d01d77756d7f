// Cache path utilities.
// Lays out one record file per tracked repository under each user's directory.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::github::RepoCoordinates;

/// Get the default cache directory (~/.cache/runwatch on Linux).
pub fn cache_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "runwatch").map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Path to a user's directory.
pub fn user_dir(base: &Path, owner_identity: &str) -> PathBuf {
    base.join("users").join(sanitize_name(owner_identity))
}

/// Path to the directory holding a user's tracked repositories.
pub fn repos_dir(base: &Path, owner_identity: &str) -> PathBuf {
    user_dir(base, owner_identity).join("repos")
}

/// Path to the record file for one tracked repository.
pub fn record_path(base: &Path, owner_identity: &str, repo: &RepoCoordinates) -> PathBuf {
    repos_dir(base, owner_identity)
        .join(sanitize_name(&repo.owner))
        .join(format!("{}.json", sanitize_name(&repo.name)))
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
fn sanitize_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect();

    match sanitized.as_str() {
        "." | ".." => sanitized.replace('.', "_"),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("simple"), "simple");
        assert_eq!(sanitize_name("with/slash"), "with_slash");
        assert_eq!(sanitize_name("owner:name"), "owner_name");
        assert_eq!(sanitize_name(".."), "__");
        assert_eq!(sanitize_name(".github"), ".github");
    }

    #[test]
    fn test_record_path() {
        let base = Path::new("/tmp/runwatch");
        let repo = RepoCoordinates::new("phatblat", "jolt");

        let path = record_path(base, "583231", &repo);
        assert!(path.ends_with("users/583231/repos/phatblat/jolt.json"));
        assert!(repos_dir(base, "583231").ends_with("users/583231/repos"));
    }
}
