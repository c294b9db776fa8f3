use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use quill::{
    application::{
        admin::AdminService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, HealthRepo, PostsRepo, PostsWriteRepo,
            UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState, MemoryResponseStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AdminState, AuthConfig, HttpState, ViewerResolver},
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::{sync::watch, try_join};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain: Vec<String> =
        std::iter::successors(Some(error as &dyn std::error::Error), |err| err.source())
            .map(ToString::to_string)
            .collect();

    if dispatcher::has_been_set() {
        error!(error = %error, chain = ?chain, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, chain = ?chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let app = build_application_context(repositories, &settings)?;
    serve_http(&settings, app).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let pool = connect_pool(&settings).await?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    info!(target = "quill::migrate", "migrations applied");
    Ok(())
}

async fn connect_pool(settings: &config::Settings) -> Result<sqlx::PgPool, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::MissingDatabaseUrl)?;

    PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| InfraError::Connect(err).into())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let pool = connect_pool(settings).await?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

struct ApplicationContext {
    http_state: HttpState,
    admin_state: AdminState,
    resolver: ViewerResolver,
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<ApplicationContext, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories.clone();

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone()).map_err(|source| {
            InfraError::UploadRoot {
                path: settings.uploads.directory.clone(),
                source,
            }
        })?,
    );

    let cache_config = CacheConfig::from(&settings.cache);
    let cache_state = cache_config.is_enabled().then(|| {
        let store = Arc::new(MemoryResponseStore::new(&cache_config));
        CacheState::new(cache_config.clone(), store)
    });

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        follows_repo.clone(),
        comments_repo.clone(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        posts_write_repo.clone(),
        groups_repo.clone(),
        comments_repo,
        upload_storage.clone(),
    ));
    let follows = Arc::new(FollowService::new(users_repo.clone(), follows_repo));
    let admin = Arc::new(AdminService::new(
        users_repo.clone(),
        groups_repo,
        posts_write_repo,
    ));

    let auth = AuthConfig::from(&settings.auth);
    let upload_limit_bytes =
        usize::try_from(settings.uploads.max_request_bytes.get()).unwrap_or(usize::MAX);

    let http_state = HttpState {
        feed,
        posts,
        follows,
        health: health_repo.clone(),
        upload_storage,
        auth: auth.clone(),
        cache: cache_state.clone(),
        upload_limit_bytes,
    };
    let admin_state = AdminState {
        admin,
        health: health_repo,
        cache: cache_state,
    };
    let resolver = ViewerResolver {
        config: auth,
        users: users_repo,
    };

    Ok(ApplicationContext {
        http_state,
        admin_state,
        resolver,
    })
}

async fn serve_http(settings: &config::Settings, app: ApplicationContext) -> Result<(), AppError> {
    let public_router = http::build_router(app.http_state, app.resolver);
    let admin_router = http::build_admin_router(app.admin_state);

    let public_listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(InfraError::bind(settings.server.public_addr))?;
    let admin_listener = tokio::net::TcpListener::bind(settings.server.admin_addr)
        .await
        .map_err(InfraError::bind(settings.server.admin_addr))?;

    info!(
        target = "quill::serve",
        public = %settings.server.public_addr,
        admin = %settings.server.admin_addr,
        "listeners bound"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let public_server = axum::serve(public_listener, public_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()))
        .into_future();
    let admin_server = axum::serve(admin_listener, admin_router.into_make_service())
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .into_future();

    let servers = async { try_join!(public_server, admin_server) };
    tokio::pin!(servers);

    let result = tokio::select! {
        result = &mut servers => result,
        () = shutdown_signal() => {
            info!(target = "quill::serve", "shutdown requested, draining connections");
            let _ = shutdown_tx.send(true);
            drain(&mut servers, settings.server.graceful_shutdown).await
        }
    };

    result
        .map(|_| ())
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn drain<F, T>(servers: &mut F, grace: Duration) -> Result<T, std::io::Error>
where
    F: std::future::Future<Output = Result<T, std::io::Error>> + Unpin,
    T: Default,
{
    match tokio::time::timeout(grace, servers).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                target = "quill::serve",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out, dropping open connections"
            );
            Ok(T::default())
        }
    }
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(target = "quill::serve", error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(target = "quill::serve", error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
