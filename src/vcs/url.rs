use std::{path::PathBuf, sync::OnceLock};

use regex_lite::Regex;

fn scp_like() -> &'static Regex {
    static SCP_LIKE: OnceLock<Regex> = OnceLock::new();
    SCP_LIKE.get_or_init(|| {
        Regex::new(r"^(?P<user>[^@/:]+@)?(?P<host>[^/:]+):(?P<path>[^/].*)$")
            .expect("scp-like url pattern is valid")
    })
}

/// Normalizes a repository URL so that spellings of the same remote share a key.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let url = url.strip_prefix("git+").unwrap_or(url);

    let url = if !url.contains("://") {
        match scp_like().captures(url) {
            Some(captures) => format!(
                "ssh://{}{}/{}",
                captures.name("user").map_or("", |m| m.as_str()),
                &captures["host"],
                &captures["path"]
            ),
            None => url.to_owned(),
        }
    } else {
        url.to_owned()
    };

    let mut url = url.trim_end_matches('/').to_owned();
    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.trim_end_matches('/').to_owned();
    }

    match url.split_once("://") {
        Some((scheme, rest)) => {
            let (authority, path) = match rest.find('/') {
                Some(index) => rest.split_at(index),
                None => (rest, ""),
            };
            let authority = match authority.rsplit_once('@') {
                Some((user, host)) => format!("{user}@{}", host.to_ascii_lowercase()),
                None => authority.to_ascii_lowercase(),
            };
            format!("{}://{authority}{path}", scheme.to_ascii_lowercase())
        }
        None => url,
    }
}

const HASH_LENGTH: usize = 16;

/// A relative directory for a normalized URL: the host (or `local` for paths), then the
/// last path segment suffixed with a hash of the whole URL. Distinct URLs never share a
/// directory, and directories never nest.
pub fn url_to_path(normalized_url: &str) -> Result<PathBuf, git2::Error> {
    let (host, rest) = match normalized_url.split_once("://") {
        Some((_, rest)) => {
            let rest = match rest.split_once('@') {
                Some((user, host_and_path)) if !user.contains('/') => host_and_path,
                _ => rest,
            };
            match rest.split_once('/') {
                Some((host, path)) => (host, path),
                None => (rest, ""),
            }
        }
        None => ("local", normalized_url),
    };
    let name = rest
        .rsplit('/')
        .find(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .unwrap_or("root");

    let hash = git2::Oid::hash_object(git2::ObjectType::Blob, normalized_url.as_bytes())?;
    let hash = hash.to_string();

    Ok(PathBuf::from(sanitize(host)).join(format!(
        "{}-{}",
        sanitize(name),
        &hash[..HASH_LENGTH]
    )))
}

fn sanitize(segment: &str) -> String {
    let sanitized: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match sanitized.trim_matches('.') {
        "" => "_".to_owned(),
        _ => sanitized,
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, path::Path};

    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn equivalent_spellings_share_a_key() {
        let expected = "https://github.com/oss-review-toolkit/ort";
        for url in [
            "https://github.com/oss-review-toolkit/ort",
            "https://github.com/oss-review-toolkit/ort/",
            "https://github.com/oss-review-toolkit/ort.git",
            "git+https://github.com/oss-review-toolkit/ort.git",
            "HTTPS://GitHub.com/oss-review-toolkit/ort",
            "  https://github.com/oss-review-toolkit/ort  ",
        ] {
            assert_eq!(normalize_url(url), expected, "{url}");
        }
    }

    #[test]
    fn path_case_is_preserved() {
        assert_eq!(
            normalize_url("https://example.com/Org/Repo"),
            "https://example.com/Org/Repo"
        );
    }

    #[test]
    fn scp_like_url() {
        assert_eq!(
            normalize_url("git@github.com:org/repo.git"),
            "ssh://git@github.com/org/repo"
        );
    }

    #[test]
    fn local_paths_are_kept() {
        assert_eq!(normalize_url("/tmp/repos/origin/"), "/tmp/repos/origin");
    }

    #[test]
    fn path_for_url() {
        let path = url_to_path("ssh://git@github.com/org/repo").unwrap();
        assert_eq!(path.parent().unwrap(), Path::new("github.com"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("repo-"), "{name}");
        assert_eq!(name.len(), "repo-".len() + HASH_LENGTH);

        let path = url_to_path("/tmp/../x y").unwrap();
        assert_eq!(path.parent().unwrap(), Path::new("local"));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("x_y-"));
    }

    #[test]
    fn distinct_urls_get_distinct_paths() {
        let urls = [
            "https://example.com/org/repo",
            "ssh://git@example.com/org/repo",
            "http://example.com/org/repo",
            "https://example.com/org/x y",
            "https://example.com/org/x_y",
            "/a/../b",
            "/a/b",
            "/b",
        ];
        let paths: HashSet<PathBuf> = urls.iter().map(|url| url_to_path(url).unwrap()).collect();
        assert_eq!(paths.len(), urls.len());
    }

    #[test]
    fn path_is_stable() {
        assert_eq!(
            url_to_path("https://example.com/org/repo").unwrap(),
            url_to_path(&normalize_url("git+https://EXAMPLE.com/org/repo.git")).unwrap()
        );
    }
}
