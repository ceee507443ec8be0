//! Fake collaborators: remote listing API, API provider and checkout

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use gitviz_common::time::ManualClock;
use gitviz_import::services::{
    Checkout, CloneError, CloneOptions, GitHubError, OwnerKind, RemoteApi, RemoteApiProvider,
    RemoteRepo, StatusRegistry,
};
use gitviz_import::BulkImportError;

/// Remote API serving fixed owners from memory
#[derive(Default)]
pub struct FakeRemote {
    orgs: HashMap<String, Vec<RemoteRepo>>,
    users: HashMap<String, Vec<RemoteRepo>>,
    reject_token: bool,
    pub probe_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_org(mut self, owner: &str, repos: Vec<RemoteRepo>) -> Self {
        self.orgs.insert(owner.to_lowercase(), repos);
        self
    }

    pub fn with_user(mut self, owner: &str, repos: Vec<RemoteRepo>) -> Self {
        self.users.insert(owner.to_lowercase(), repos);
        self
    }

    /// Answer every call with 401
    pub fn rejecting_token(mut self) -> Self {
        self.reject_token = true;
        self
    }

    pub fn total_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst) + self.page_calls.load(Ordering::SeqCst)
    }

    fn owned(&self, kind: OwnerKind, owner: &str) -> Option<&Vec<RemoteRepo>> {
        match kind {
            OwnerKind::Organization => self.orgs.get(&owner.to_lowercase()),
            OwnerKind::User => self.users.get(&owner.to_lowercase()),
        }
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn probe_owner(&self, kind: OwnerKind, owner: &str) -> Result<(), GitHubError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_token {
            return Err(GitHubError::Unauthorized);
        }
        self.owned(kind, owner)
            .map(|_| ())
            .ok_or_else(|| GitHubError::NotFound(owner.to_string()))
    }

    async fn list_page(
        &self,
        kind: OwnerKind,
        owner: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<RemoteRepo>, GitHubError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.reject_token {
            return Err(GitHubError::Unauthorized);
        }
        let repos = self
            .owned(kind, owner)
            .ok_or_else(|| GitHubError::NotFound(owner.to_string()))?;
        let start = ((page - 1) * per_page) as usize;
        Ok(repos
            .iter()
            .skip(start)
            .take(per_page as usize)
            .cloned()
            .collect())
    }
}

/// Provider handing out the shared fake remote
pub struct FakeProvider {
    remote: Arc<FakeRemote>,
    pub connects: AtomicUsize,
    pub tokens: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new(remote: Arc<FakeRemote>) -> Self {
        Self {
            remote,
            connects: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
        }
    }
}

impl RemoteApiProvider for FakeProvider {
    fn connect(&self, token: &str) -> Result<Arc<dyn RemoteApi>, BulkImportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        let remote: Arc<dyn RemoteApi> = self.remote.clone();
        Ok(remote)
    }
}

/// Scripted result of a clone, keyed by repository name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloneBehavior {
    /// Create the checkout and report progress
    Succeed,
    /// Leave a partial directory and fail with a path-length error unless
    /// long paths are enabled
    FailFilesystemUnlessLongPaths,
    /// Leave a partial directory and fail with a non-filesystem error
    AlwaysFail,
    /// Leave a partial directory and never finish
    Stall,
    /// Panic once any stalling clone of the batch is underway
    Panic,
}

/// One observed clone call
#[derive(Debug, Clone)]
pub struct CloneCall {
    pub url: String,
    pub dest: PathBuf,
    pub options: CloneOptions,
    /// Tasks settled in the job when the call started
    pub settled_at_start: usize,
}

/// Checkout that writes directories instead of running git
pub struct FakeCheckout {
    behaviors: Mutex<HashMap<String, CloneBehavior>>,
    calls: Mutex<Vec<CloneCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    max_registry_cloning: AtomicUsize,
    stalled: AtomicUsize,
    watch: Mutex<Option<(Arc<StatusRegistry>, Uuid)>>,
    clone_time: Option<(ManualClock, Duration)>,
}

impl FakeCheckout {
    pub fn new() -> Self {
        Self {
            behaviors: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            max_registry_cloning: AtomicUsize::new(0),
            stalled: AtomicUsize::new(0),
            watch: Mutex::new(None),
            clone_time: None,
        }
    }

    /// Successful clones advance `clock` by `duration`
    pub fn with_clone_time(mut self, clock: ManualClock, duration: Duration) -> Self {
        self.clone_time = Some((clock, duration));
        self
    }

    pub fn with_behavior(self, repo: &str, behavior: CloneBehavior) -> Self {
        self.behaviors.lock().unwrap().insert(repo.to_string(), behavior);
        self
    }

    /// Observe `job_id` in `registry` on every clone call
    pub fn watch(&self, registry: Arc<StatusRegistry>, job_id: Uuid) {
        *self.watch.lock().unwrap() = Some((registry, job_id));
    }

    pub fn calls(&self) -> Vec<CloneCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Highest registry cloning count seen by any call
    pub fn max_registry_cloning(&self) -> usize {
        self.max_registry_cloning.load(Ordering::SeqCst)
    }

    fn behavior_for(&self, url: &str) -> CloneBehavior {
        let name = url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git");
        self.behaviors
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(CloneBehavior::Succeed)
    }

    fn has_stalling_clone(&self) -> bool {
        self.behaviors
            .lock()
            .unwrap()
            .values()
            .any(|b| *b == CloneBehavior::Stall)
    }

    fn observe_registry(&self) -> usize {
        let watch = self.watch.lock().unwrap().clone();
        let Some((registry, job_id)) = watch else {
            return 0;
        };
        let Some(job) = registry.get(job_id) else {
            return 0;
        };
        let counts = job.counts();
        self.max_registry_cloning.fetch_max(counts.cloning, Ordering::SeqCst);
        counts.settled()
    }
}

impl Default for FakeCheckout {
    fn default() -> Self {
        Self::new()
    }
}

fn write_partial(dest: &Path) {
    std::fs::create_dir_all(dest).unwrap();
    std::fs::write(dest.join(".partial"), b"interrupted").unwrap();
}

#[async_trait]
impl Checkout for FakeCheckout {
    async fn clone_repo(
        &self,
        url: &str,
        dest: &Path,
        options: &CloneOptions,
        on_progress: &(dyn for<'s> Fn(&'s str) + Send + Sync),
    ) -> Result<(), CloneError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let settled_at_start = self.observe_registry();

        // A fresh attempt must never find leftovers of a previous one
        assert!(
            !dest.join(".partial").exists(),
            "destination was not purged before retry: {}",
            dest.display()
        );

        self.calls.lock().unwrap().push(CloneCall {
            url: url.to_string(),
            dest: dest.to_path_buf(),
            options: options.clone(),
            settled_at_start,
        });

        let behavior = self.behavior_for(url);

        // Let the other members of the batch start
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        let result = match behavior {
            CloneBehavior::Succeed => {
                on_progress("Cloning into 'repo'...");
                on_progress("Receiving objects:  50% (5/10)");
                on_progress("Receiving objects: 100% (10/10), done.");
                std::fs::create_dir_all(dest.join(".git")).unwrap();
                std::fs::write(dest.join("README.md"), b"# test").unwrap();
                if let Some((clock, duration)) = &self.clone_time {
                    clock.advance(*duration);
                }
                Ok(())
            }
            CloneBehavior::FailFilesystemUnlessLongPaths if options.long_paths => {
                std::fs::create_dir_all(dest.join(".git")).unwrap();
                Ok(())
            }
            CloneBehavior::FailFilesystemUnlessLongPaths => {
                write_partial(dest);
                Err(CloneError::Failed {
                    code: Some(128),
                    output: "error: unable to create file src/very/deep/path.rs: Filename too long"
                        .to_string(),
                })
            }
            CloneBehavior::AlwaysFail => {
                write_partial(dest);
                Err(CloneError::Failed {
                    code: Some(128),
                    output: "fatal: remote end hung up unexpectedly".to_string(),
                })
            }
            CloneBehavior::Stall => {
                write_partial(dest);
                self.stalled.fetch_add(1, Ordering::SeqCst);
                std::future::pending::<()>().await;
                Ok(())
            }
            CloneBehavior::Panic => {
                if self.has_stalling_clone() {
                    for _ in 0..2000 {
                        if self.stalled.load(Ordering::SeqCst) > 0 {
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                panic!("simulated checkout crash");
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
