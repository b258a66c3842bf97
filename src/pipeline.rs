//! One end-to-end pipeline run.
//!
//! A run is triggered by an admitted webhook notification and goes resolve →
//! dedup → fetch → publish → cleanup. Runs triggered by overlapping
//! deliveries execute concurrently; correctness rests entirely on the
//! [`DedupGate`]'s atomicity, not on any serialization of runs. No error
//! from a run ever reaches the HTTP response that triggered it.

use thiserror::Error;
use tracing::{debug, info, warn};

use std::sync::Arc;

use crate::dedupe::DedupGate;
use crate::fetch::{FetchError, ImageFetcher, MediaTransport};
use crate::graph::{FeedResolver, GraphApi, ResolveError};
use crate::mastodon::{PublishApi, PublishError, Publisher};
use crate::types::{ImageId, PostId, StatusId};

use crate::credential::TokenRefresher;

/// Errors that abort a pipeline run.
///
/// Run-aborting only: the run stops and is logged, the next webhook trigger
/// starts a fresh attempt.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// How a run ended when it did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Neither save nor mastodon mode is enabled; nothing to do.
    Disabled,
    /// The resolved post was at or below the watermark.
    Duplicate(PostId),
    /// The first image file was already on disk.
    AlreadyDownloaded(ImageId),
    /// The post was processed.
    Completed {
        post: PostId,
        images: usize,
        status: Option<StatusId>,
    },
}

struct PipelineInner<A, T, P> {
    refresher: Arc<TokenRefresher<A>>,
    resolver: FeedResolver<A>,
    gate: DedupGate,
    fetcher: ImageFetcher<T>,
    publisher: Option<Publisher<P>>,
    /// Save mode: keep downloaded files after the run.
    keep_local_copies: bool,
}

/// The assembled pipeline. Cheap to clone; clones share the dedup gate and
/// the session source.
pub struct Pipeline<A, T, P> {
    inner: Arc<PipelineInner<A, T, P>>,
}

impl<A, T, P> Clone for Pipeline<A, T, P> {
    fn clone(&self) -> Self {
        Pipeline {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, T, P> Pipeline<A, T, P>
where
    A: GraphApi,
    T: MediaTransport,
    P: PublishApi,
{
    pub fn new(
        refresher: Arc<TokenRefresher<A>>,
        resolver: FeedResolver<A>,
        gate: DedupGate,
        fetcher: ImageFetcher<T>,
        publisher: Option<Publisher<P>>,
        keep_local_copies: bool,
    ) -> Self {
        Pipeline {
            inner: Arc::new(PipelineInner {
                refresher,
                resolver,
                gate,
                fetcher,
                publisher,
                keep_local_copies,
            }),
        }
    }

    /// Executes one full run.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        let inner = &*self.inner;

        if !inner.keep_local_copies && inner.publisher.is_none() {
            return Ok(RunOutcome::Disabled);
        }

        let session = inner.refresher.current_session().await;
        let resolved = inner.resolver.resolve(&session).await?;

        if !inner.gate.admit(resolved.post_id) {
            debug!(post = %resolved.post_id, "post already processed");
            return Ok(RunOutcome::Duplicate(resolved.post_id));
        }

        let files = match inner.fetcher.fetch(&resolved.images).await {
            Ok(files) => files,
            Err(FetchError::AlreadyExists(id)) => {
                debug!(image = %id, "image already on disk, nothing new to do");
                return Ok(RunOutcome::AlreadyDownloaded(id));
            }
            Err(error) => return Err(error.into()),
        };

        let status = match &inner.publisher {
            Some(publisher) => Some(publisher.publish(&resolved.caption, &files).await?),
            None => None,
        };

        if !inner.keep_local_copies {
            for file in &files {
                if let Err(error) = tokio::fs::remove_file(file).await {
                    warn!(%error, file = %file.display(), "file delete failed");
                }
            }
        }

        Ok(RunOutcome::Completed {
            post: resolved.post_id,
            images: files.len(),
            status,
        })
    }
}

/// Fire-and-forget entry point used by the webhook listener.
///
/// `dispatch` must never block the caller; completion is reported only via
/// logging.
pub trait PipelineDispatcher: Send + Sync {
    fn dispatch(&self);
}

impl<A, T, P> PipelineDispatcher for Pipeline<A, T, P>
where
    A: GraphApi + 'static,
    T: MediaTransport + 'static,
    P: PublishApi + 'static,
{
    fn dispatch(&self) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            match pipeline.run().await {
                Ok(outcome) => info!(?outcome, "pipeline run finished"),
                Err(error) => warn!(%error, "pipeline run failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    use crate::credential::{Credential, CredentialStore};
    use crate::graph::resolver::TRACKED_APP_NAMESPACE;
    use crate::graph::types::{
        Application, ExchangedToken, FeedEntry, FeedPage, ImageObject, ImageVariant,
    };
    use crate::graph::{GraphApiError, Session};
    use crate::mastodon::PublishError;
    use crate::types::MediaId;
    use chrono::Utc;

    /// Stub feed service serving one tracked post.
    struct StubGraph {
        page: FeedPage,
        images: HashMap<String, ImageObject>,
        feed_calls: AtomicUsize,
    }

    impl StubGraph {
        fn single_post(post_id: u64, caption: &str) -> Self {
            let entry = FeedEntry {
                id: format!("user_{post_id}"),
                object_id: post_id.to_string(),
                message: caption.to_string(),
                application: Application {
                    namespace: TRACKED_APP_NAMESPACE.to_string(),
                    ..Default::default()
                },
                attachments: None,
            };
            let image = ImageObject {
                id: post_id.to_string(),
                name: String::new(),
                images: vec![ImageVariant {
                    width: 1280,
                    height: 720,
                    source: format!("https://cdn.example/{post_id}.jpg"),
                }],
            };
            let mut images = HashMap::new();
            images.insert(post_id.to_string(), image);
            StubGraph {
                page: FeedPage { data: vec![entry] },
                images,
                feed_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl GraphApi for StubGraph {
        async fn fetch_feed(&self, _session: &Session) -> Result<FeedPage, GraphApiError> {
            self.feed_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.page.clone())
        }

        async fn fetch_image(
            &self,
            _session: &Session,
            object_id: &str,
        ) -> Result<ImageObject, GraphApiError> {
            Ok(self.images.get(object_id).cloned().unwrap_or_default())
        }

        async fn exchange_token(
            &self,
            _session: &Session,
        ) -> Result<ExchangedToken, GraphApiError> {
            unimplemented!("not used by pipeline tests")
        }

        async fn redeem_code(
            &self,
            _app_id: &str,
            _app_secret: &str,
            _redirect_uri: &str,
            _code: &str,
        ) -> Result<String, GraphApiError> {
            unimplemented!("not used by pipeline tests")
        }

        async fn subscribe(
            &self,
            _app_id: &str,
            _app_secret: &str,
            _callback_url: &str,
            _verify_token: &str,
        ) -> Result<serde_json::Value, GraphApiError> {
            unimplemented!("not used by pipeline tests")
        }
    }

    /// Stub transport that materializes dummy files.
    #[derive(Default)]
    struct StubTransport;

    #[async_trait]
    impl MediaTransport for StubTransport {
        async fn download(&self, _url: &str, dest: &Path) -> Result<(), FetchError> {
            tokio::fs::write(dest, b"image-bytes").await?;
            Ok(())
        }
    }

    /// Stub publisher counting publishes.
    #[derive(Default)]
    struct StubPublisher {
        publishes: AtomicUsize,
        captions: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl PublishApi for StubPublisher {
        async fn upload_media(&self, _path: &Path) -> Result<MediaId, PublishError> {
            Ok(MediaId::new("media-1"))
        }

        async fn post_status(
            &self,
            text: &str,
            _media_ids: &[MediaId],
        ) -> Result<StatusId, PublishError> {
            if self.fail {
                return Err(PublishError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.publishes.fetch_add(1, Ordering::SeqCst);
            self.captions.lock().unwrap().push(text.to_string());
            Ok(StatusId::new("status-1"))
        }
    }

    struct Fixture {
        pipeline: Pipeline<StubGraph, StubTransport, StubPublisher>,
        graph: Arc<StubGraph>,
        publisher: Arc<StubPublisher>,
        image_dir: tempfile::TempDir,
        _config_dir: tempfile::TempDir,
    }

    fn fixture(graph: StubGraph, publisher: Option<StubPublisher>, keep: bool) -> Fixture {
        let image_dir = tempdir().unwrap();
        let config_dir = tempdir().unwrap();
        let graph = Arc::new(graph);
        let publisher = Arc::new(publisher.unwrap_or_default());

        let store = CredentialStore::new(config_dir.path().join("credential.json"));
        let credential = Credential {
            token: "token".to_string(),
            expires_at: Utc::now() + chrono::Duration::days(60),
        };
        let refresher = Arc::new(TokenRefresher::new(
            graph.clone(),
            store,
            "app",
            "secret",
            credential,
        ));

        let pipeline = Pipeline::new(
            refresher,
            FeedResolver::new(graph.clone()),
            DedupGate::new(),
            ImageFetcher::new(Arc::new(StubTransport), image_dir.path()),
            Some(Publisher::new(publisher.clone())),
            keep,
        );

        Fixture {
            pipeline,
            graph,
            publisher,
            image_dir,
            _config_dir: config_dir,
        }
    }

    #[tokio::test]
    async fn completed_run_publishes_and_cleans_up() {
        let f = fixture(StubGraph::single_post(42, "caption"), None, false);

        let outcome = f.pipeline.run().await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                post: PostId(42),
                images: 1,
                status: Some(StatusId::new("status-1")),
            }
        );
        assert_eq!(f.publisher.publishes.load(Ordering::SeqCst), 1);
        assert_eq!(*f.publisher.captions.lock().unwrap(), vec!["caption"]);
        // Save mode off: local copy deleted after publishing.
        assert!(!f.image_dir.path().join("42.jpg").exists());
    }

    #[tokio::test]
    async fn save_mode_keeps_local_copies() {
        let f = fixture(StubGraph::single_post(42, ""), None, true);

        f.pipeline.run().await.unwrap();
        assert!(f.image_dir.path().join("42.jpg").exists());
    }

    #[tokio::test]
    async fn second_run_for_same_post_is_a_duplicate() {
        let f = fixture(StubGraph::single_post(42, ""), None, false);

        assert!(matches!(
            f.pipeline.run().await.unwrap(),
            RunOutcome::Completed { .. }
        ));
        assert_eq!(
            f.pipeline.run().await.unwrap(),
            RunOutcome::Duplicate(PostId(42))
        );
        assert_eq!(f.publisher.publishes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn overlapping_runs_publish_exactly_once() {
        let f = fixture(StubGraph::single_post(42, ""), None, false);

        let (a, b) = tokio::join!(f.pipeline.run(), f.pipeline.run());
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(f.publisher.publishes.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, RunOutcome::Completed { .. }))
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, RunOutcome::Duplicate(_)))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn disabled_modes_touch_nothing() {
        let f = {
            let image_dir = tempdir().unwrap();
            let config_dir = tempdir().unwrap();
            let graph = Arc::new(StubGraph::single_post(42, ""));
            let store = CredentialStore::new(config_dir.path().join("credential.json"));
            let credential = Credential {
                token: "token".to_string(),
                expires_at: Utc::now() + chrono::Duration::days(60),
            };
            let refresher = Arc::new(TokenRefresher::new(
                graph.clone(),
                store,
                "app",
                "secret",
                credential,
            ));
            let pipeline: Pipeline<StubGraph, StubTransport, StubPublisher> = Pipeline::new(
                refresher,
                FeedResolver::new(graph.clone()),
                DedupGate::new(),
                ImageFetcher::new(Arc::new(StubTransport), image_dir.path()),
                None,
                false,
            );
            Fixture {
                pipeline,
                graph,
                publisher: Arc::new(StubPublisher::default()),
                image_dir,
                _config_dir: config_dir,
            }
        };

        assert_eq!(f.pipeline.run().await.unwrap(), RunOutcome::Disabled);
        assert_eq!(f.graph.feed_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn leftover_file_is_a_benign_no_op() {
        // Watermark lost on restart: the gate admits the post again, but the
        // file-level check catches it.
        let f = fixture(StubGraph::single_post(42, ""), None, true);
        std::fs::write(f.image_dir.path().join("42.jpg"), b"old").unwrap();

        assert_eq!(
            f.pipeline.run().await.unwrap(),
            RunOutcome::AlreadyDownloaded(ImageId::new("42"))
        );
        assert_eq!(f.publisher.publishes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_publish_aborts_and_keeps_files() {
        let f = fixture(
            StubGraph::single_post(42, ""),
            Some(StubPublisher {
                fail: true,
                ..Default::default()
            }),
            false,
        );

        let err = f.pipeline.run().await.unwrap_err();
        assert!(matches!(err, RunError::Publish(_)));
        // Cleanup is skipped on an aborted run.
        assert!(f.image_dir.path().join("42.jpg").exists());
        // The watermark already advanced: at-most-once holds even on failure.
        assert_eq!(
            f.pipeline.run().await.unwrap(),
            RunOutcome::Duplicate(PostId(42))
        );
    }
}
