use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use switchfeed::config::Config;
use switchfeed::credential::{
    AuthorizeError, CredentialStore, TokenRefresher, interactive_authorize,
};
use switchfeed::dedupe::DedupGate;
use switchfeed::fetch::{HttpTransport, ImageFetcher};
use switchfeed::graph::{FeedResolver, GraphApi, GraphClient};
use switchfeed::mastodon::{MastodonClient, Publisher};
use switchfeed::pipeline::Pipeline;
use switchfeed::server::{AppState, build_router};

// One exit code per fatal cause.
const EXIT_CONFIG: i32 = 1;
const EXIT_AUTHORIZE: i32 = 2;
const EXIT_REFRESH: i32 = 3;

/// Verify token registered with the webhook subscription.
const VERIFY_TOKEN: &str = "switchfeed";

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "switchfeed=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "configuration error");
            exit(EXIT_CONFIG);
        }
    };

    let (config_dir, image_dir) = match prepare_dirs(&base_dir()) {
        Ok(dirs) => dirs,
        Err(error) => {
            error!(%error, "could not prepare state directories");
            exit(EXIT_CONFIG);
        }
    };

    // The server comes up before bootstrap finishes: the interactive
    // authorization redirect lands on /token, which must already be served.
    let state = AppState::new();
    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(error) => {
            error!(%error, %addr, "could not bind listener");
            exit(EXIT_CONFIG);
        }
    };
    info!("server listening on {addr}");
    let app = build_router(state.clone());
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let api = Arc::new(GraphClient::new());
    let store = CredentialStore::new(config_dir.join("credential.json"));

    let (credential, freshly_authorized) = match store.load() {
        Some(credential) => (credential, false),
        None => {
            let authorized = interactive_authorize(
                api.as_ref(),
                &config.app_id,
                &config.app_secret,
                &config.base_url,
            )
            .await;
            match authorized {
                Ok(credential) => {
                    if let Err(error) = store.save(&credential) {
                        warn!(%error, "credential write failed");
                    }
                    (credential, true)
                }
                Err(error @ AuthorizeError::Exchange(_)) => {
                    error!(%error, "long-lived token exchange failed");
                    exit(EXIT_REFRESH);
                }
                Err(error) => {
                    error!(%error, "interactive authorization failed");
                    exit(EXIT_AUTHORIZE);
                }
            }
        }
    };

    let refresher = Arc::new(TokenRefresher::new(
        api.clone(),
        store,
        &config.app_id,
        &config.app_secret,
        credential,
    ));

    // A stored credential is exchanged right away so the process never runs
    // on one about to expire.
    if !freshly_authorized {
        if let Err(error) = refresher.refresh().await {
            error!(%error, "startup token refresh failed; manual reauthorization required");
            exit(EXIT_REFRESH);
        }
    }

    let callback_url = format!("{}/webhook", config.base_url);
    match api
        .subscribe(&config.app_id, &config.app_secret, &callback_url, VERIFY_TOKEN)
        .await
    {
        Ok(result) => info!(%result, "subscription registered"),
        Err(error) => warn!(%error, "subscribe error"),
    }

    let publisher = config
        .mastodon
        .as_ref()
        .map(|m| Publisher::new(Arc::new(MastodonClient::new(&m.base_url, &m.access_token))));
    let pipeline = Pipeline::new(
        refresher.clone(),
        FeedResolver::new(api.clone()),
        DedupGate::new(),
        ImageFetcher::new(Arc::new(HttpTransport::new()), image_dir),
        publisher,
        config.mode.save,
    );
    state.set_dispatcher(Arc::new(pipeline));
    info!(save = config.mode.save, mastodon = config.mode.mastodon, "pipeline ready");

    let cancel = CancellationToken::new();
    let refresh_loop = {
        let refresher = refresher.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { refresher.run(cancel).await })
    };

    tokio::select! {
        result = server => {
            cancel.cancel();
            match result {
                Ok(Ok(())) => info!("server stopped"),
                Ok(Err(error)) => error!(%error, "server error"),
                Err(error) => error!(%error, "server task failed"),
            }
        }
        result = refresh_loop => {
            cancel.cancel();
            match result {
                Ok(Ok(())) => info!("refresh loop stopped"),
                Ok(Err(error)) => {
                    error!(%error, "token refresh failed; manual reauthorization required");
                    exit(EXIT_REFRESH);
                }
                Err(error) => error!(%error, "refresh task failed"),
            }
        }
    }
}

/// The directory the binary lives in; state directories sit next to it.
fn base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Creates the `config/` and `images/` directories.
fn prepare_dirs(base: &Path) -> std::io::Result<(PathBuf, PathBuf)> {
    let config_dir = base.join("config");
    let image_dir = base.join("images");
    std::fs::create_dir_all(&config_dir)?;
    std::fs::create_dir_all(&image_dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))?;
        std::fs::set_permissions(&image_dir, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok((config_dir, image_dir))
}
