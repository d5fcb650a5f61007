//! Reads the defaults a working copy can offer: the checked out branch and
//! the owner and name of the repository behind a remote.

use std::process::Command;

use anyhow::Context;
use url::Url;

/// Owner and name of a repository on the forge.
#[derive(Debug, PartialEq, Eq)]
pub struct RemoteRepo {
    pub owner: String,
    pub name: String,
}

/// Gets the name of the current git branch.
///
/// # Errors
///
/// Returns an error if git fails or no branch is checked out.
pub fn get_current_branch() -> anyhow::Result<String> {
    let branch = run_git(&["branch", "--show-current"])?;

    if branch.is_empty() {
        anyhow::bail!("No branch checked out.");
    }

    Ok(branch)
}

/// Gets the repository a remote points at.
///
/// # Errors
///
/// Returns an error if the remote doesn't exist or its URL doesn't end in
/// `<owner>/<repo>`.
pub fn get_remote_repo(remote: &str) -> anyhow::Result<RemoteRepo> {
    let remote_url = run_git(&["remote", "get-url", remote])
        .with_context(|| format!("Failed to get URL for remote '{remote}'"))?;

    parse_remote_repo(&remote_url)
        .with_context(|| format!("Remote URL '{remote_url}' doesn't name an owner and repository"))
}

/// Takes owner and repository from the last two path segments of a remote
/// URL, so forges served below a subpath work too. Accepts `http(s)://`,
/// `ssh://` and `git://` URLs as well as the scp-like `user@host:path` form.
pub fn parse_remote_repo(remote_url: &str) -> Option<RemoteRepo> {
    let path = match Url::parse(remote_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "ssh" | "git") => {
            url.path().to_string()
        }
        Ok(_) => return None,
        // scp-like syntax has no scheme, so it isn't a URL.
        Err(_) => remote_url.split_once('@')?.1.split_once(':')?.1.to_string(),
    };

    let mut segments = path
        .trim_end_matches('/')
        .trim_end_matches(".git")
        .rsplit('/')
        .filter(|segment| !segment.is_empty());
    let name = segments.next()?.to_string();
    let owner = segments.next()?.to_string();

    Some(RemoteRepo { owner, name })
}

fn run_git(args: &[&str]) -> anyhow::Result<String> {
    let output = Command::new("git")
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute git {}", args.join(" ")))?;

    if !output.status.success() {
        anyhow::bail!(
            "git {} failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(owner: &str, name: &str) -> Option<RemoteRepo> {
        Some(RemoteRepo {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    #[test]
    fn test_scp_like_remote() {
        assert_eq!(
            parse_remote_repo("git@gitea.example.com:acme/tools.git"),
            repo("acme", "tools")
        );
        assert_eq!(
            parse_remote_repo("gitea@gitea.example.com:acme/tools"),
            repo("acme", "tools")
        );
    }

    #[test]
    fn test_gitea_below_subpath() {
        assert_eq!(
            parse_remote_repo("https://example.com/git/acme/tools.git"),
            repo("acme", "tools")
        );
        assert_eq!(
            parse_remote_repo("https://example.com:3000/git/acme/tools/"),
            repo("acme", "tools")
        );
    }

    #[test]
    fn test_ssh_url_with_port() {
        assert_eq!(
            parse_remote_repo("ssh://git@gitea.example.com:2222/acme/tools.git"),
            repo("acme", "tools")
        );
    }

    #[test]
    fn test_remote_without_owner() {
        assert_eq!(parse_remote_repo("https://gitea.example.com/tools.git"), None);
        assert_eq!(parse_remote_repo("git@gitea.example.com:tools.git"), None);
    }

    #[test]
    fn test_unsupported_remotes() {
        assert_eq!(parse_remote_repo("file:///srv/git/acme/tools.git"), None);
        assert_eq!(parse_remote_repo("/srv/git/acme/tools.git"), None);
    }
}
