//! Blocking git2 operations on the working clone of one repository.
//!
//! Every function here blocks; callers run them on the blocking pool while
//! holding the repository lock.

use crate::error::{GitError, Result};
use core_fs::descriptor::{file_name, normalize_path, ROOT_PATH};
use core_runtime::logging::strip_path;
use core_sync::RemoteFileMetadata;
use git2::build::RepoBuilder;
use git2::{
    Commit, Cred, ErrorClass, ErrorCode, FetchOptions, ObjectType, Oid, PushOptions,
    RemoteCallbacks, Repository, ResetType, Signature, Sort, Tree,
};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Commit identity used for uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitAuthor {
    pub name: String,
    pub email: String,
}

impl Default for GitAuthor {
    fn default() -> Self {
        Self {
            name: "PassVault".to_string(),
            email: "passvault@localhost".to_string(),
        }
    }
}

/// Everything needed to reach a repository and its working clone.
#[derive(Clone)]
pub struct Checkout {
    pub url: String,
    pub username: String,
    pub password: String,
    pub branch: String,
    pub workdir: PathBuf,
    pub author: GitAuthor,
}

impl Checkout {
    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        let mut attempts = 0;
        callbacks.credentials(move |_url, _username_from_url, _allowed| {
            attempts += 1;
            if attempts > 1 {
                // libgit2 retries forever when the same credentials keep failing
                return Err(git2::Error::new(
                    ErrorCode::Auth,
                    ErrorClass::Callback,
                    "credentials rejected by the remote",
                ));
            }
            Cred::userpass_plaintext(&self.username, &self.password)
        });
        callbacks
    }

    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        options
    }

    fn remote_ref(&self) -> String {
        format!("refs/remotes/origin/{}", self.branch)
    }

    /// Open the working clone, cloning it first if needed.
    pub fn open(&self) -> Result<Repository> {
        if self.workdir.join(".git").exists() {
            return Ok(Repository::open(&self.workdir)?);
        }

        if let Some(parent) = self.workdir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!(
            branch = %self.branch,
            repository = strip_path(&self.url),
            "Cloning repository"
        );
        let repo = RepoBuilder::new()
            .branch(&self.branch)
            .fetch_options(self.fetch_options())
            .clone(&self.url, &self.workdir)?;
        Ok(repo)
    }

    /// Fetch the branch and hard-reset the working clone onto it, dropping
    /// any local commit that never made it to the remote.
    pub fn refresh(&self, repo: &Repository) -> Result<()> {
        let refspec = format!("+refs/heads/{0}:{1}", self.branch, self.remote_ref());
        repo.find_remote("origin")?
            .fetch(&[refspec.as_str()], Some(&mut self.fetch_options()), None)?;

        let target = repo.find_reference(&self.remote_ref())?.peel_to_commit()?;
        repo.reset(target.as_object(), ResetType::Hard, None)?;
        debug!(head = %target.id(), "Working clone reset to remote");
        Ok(())
    }

    pub fn metadata(&self, repo: &Repository, path: &str) -> Result<RemoteFileMetadata> {
        let path = normalize_path(path);
        let head = repo.head()?.peel_to_commit()?;

        if path == ROOT_PATH {
            return Ok(Self::describe(&path, None, true, &head));
        }

        let relative = relative_path(&path)?;
        let entry = head
            .tree()?
            .get_path(&relative)
            .map_err(|_| GitError::NotFound { path: path.clone() })?;

        if entry.kind() == Some(ObjectType::Tree) {
            return Ok(Self::describe(&path, None, true, &head));
        }

        let touched = last_commit_touching(repo, &relative)?
            .map(|oid| repo.find_commit(oid))
            .transpose()?;
        let commit = touched.as_ref().unwrap_or(&head);
        Ok(Self::describe(
            &path,
            Some(commit.id().to_string()),
            false,
            commit,
        ))
    }

    pub fn list(&self, repo: &Repository, dir: &str) -> Result<Vec<RemoteFileMetadata>> {
        let dir = normalize_path(dir);
        let head = repo.head()?.peel_to_commit()?;
        let root = head.tree()?;

        let tree: Tree<'_> = if dir == ROOT_PATH {
            root
        } else {
            let entry = root
                .get_path(&relative_path(&dir)?)
                .map_err(|_| GitError::NotFound { path: dir.clone() })?;
            entry
                .to_object(repo)?
                .into_tree()
                .map_err(|_| GitError::NotFound { path: dir.clone() })?
        };

        let mut entries = Vec::new();
        for entry in tree.iter() {
            let Some(name) = entry.name() else { continue };
            let child = if dir == ROOT_PATH {
                format!("/{}", name)
            } else {
                format!("{}/{}", dir, name)
            };
            entries.push(self.metadata(repo, &child)?);
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Copy the tracked file at `path` to `destination`.
    pub fn export(
        &self,
        repo: &Repository,
        path: &str,
        destination: &Path,
    ) -> Result<RemoteFileMetadata> {
        let metadata = self.metadata(repo, path)?;
        if metadata.is_directory {
            return Err(GitError::InvalidPath(format!("{} is a directory", metadata.path)));
        }
        std::fs::copy(self.workdir.join(relative_path(&metadata.path)?), destination)?;
        Ok(metadata)
    }

    /// Commit `source` as `path` and push it.
    pub fn import(
        &self,
        repo: &Repository,
        source: &Path,
        path: &str,
    ) -> Result<RemoteFileMetadata> {
        let path = normalize_path(path);
        let relative = relative_path(&path)?;
        let target = self.workdir.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(source, &target)?;

        let mut index = repo.index()?;
        index.add_path(&relative)?;
        index.write()?;
        let tree = repo.find_tree(index.write_tree()?)?;

        let parent = repo.head()?.peel_to_commit()?;
        if parent.tree_id() == tree.id() {
            debug!("Content unchanged, nothing to commit");
            return self.metadata(repo, &path);
        }

        let signature = Signature::now(&self.author.name, &self.author.email)?;
        let message = format!("Update {}", file_name(&path));
        let oid = repo.commit(Some("HEAD"), &signature, &signature, &message, &tree, &[&parent])?;
        info!(commit = %oid, "Committed local changes");

        self.push(repo)?;
        self.metadata(repo, &path)
    }

    fn push(&self, repo: &Repository) -> Result<()> {
        let mut rejection: Option<String> = None;
        {
            let mut callbacks = self.callbacks();
            callbacks.push_update_reference(|reference, status| {
                if let Some(status) = status {
                    rejection = Some(format!("{}: {}", reference, status));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);

            let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);
            repo.find_remote("origin")?
                .push(&[refspec.as_str()], Some(&mut options))
                .map_err(|e| match e.code() {
                    ErrorCode::NotFastForward => GitError::PushRejected(e.message().to_string()),
                    _ => GitError::from(e),
                })?;
        }

        match rejection {
            Some(reason) => Err(GitError::PushRejected(reason)),
            None => Ok(()),
        }
    }

    fn describe(
        path: &str,
        revision: Option<String>,
        is_directory: bool,
        commit: &Commit<'_>,
    ) -> RemoteFileMetadata {
        RemoteFileMetadata {
            uid: path.to_string(),
            path: path.to_string(),
            name: file_name(path).to_string(),
            revision,
            is_directory,
            modified: Some(commit.time().seconds() * 1000),
        }
    }
}

/// Repository-relative path of a normalized absolute path.
pub fn relative_path(path: &str) -> Result<PathBuf> {
    let relative = PathBuf::from(normalize_path(path).trim_start_matches('/'));
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(GitError::InvalidPath(path.to_string()));
    }
    Ok(relative)
}

/// Most recent commit reachable from HEAD that changed `relative`.
fn last_commit_touching(repo: &Repository, relative: &Path) -> Result<Option<Oid>> {
    let mut walk = repo.revwalk()?;
    walk.push_head()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

    for oid in walk {
        let commit = repo.find_commit(oid?)?;
        let Some(current) = blob_id(&commit, relative) else {
            continue;
        };
        let unchanged_in_parent = commit
            .parents()
            .any(|parent| blob_id(&parent, relative) == Some(current));
        if !unchanged_in_parent {
            return Ok(Some(commit.id()));
        }
    }
    Ok(None)
}

fn blob_id(commit: &Commit<'_>, relative: &Path) -> Option<Oid> {
    commit
        .tree()
        .ok()
        .and_then(|tree| tree.get_path(relative).ok())
        .map(|entry| entry.id())
}
