//! Entra Portal - OAuth2/OIDC authorization-code portal and resource API

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use entra_portal::{
    cli::{Cli, Command},
    config::Config,
    flow::AuthFlow,
    graph::GraphClient,
    jwks::KeySetResolver,
    portal::{self, PortalState},
    resource::{self, ResourceState},
    session::SessionStore,
    setup_tracing,
    verify::TokenVerifier,
};

#[tokio::main]
async fn main() -> ExitCode {
    // .env is optional; missing files are not an error.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    // Fail fast: a missing provider setting stops the process here.
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Command::Portal) => run_portal(&config).await,
        Some(Command::Resource) => run_resource(&config).await,
        Some(Command::Serve) | None => run_both(&config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn build_portal_state(config: &Config) -> Arc<PortalState> {
    let http = reqwest::Client::new();
    Arc::new(PortalState {
        sessions: SessionStore::new(),
        flow: AuthFlow::new(http.clone(), config.microsoft.clone()),
        graph: GraphClient::new(http, config.microsoft.graph_base.clone()),
        public_url: config.portal.public_url(),
    })
}

fn build_resource_state(config: &Config) -> Arc<ResourceState> {
    let resolver = KeySetResolver::new(reqwest::Client::new(), config.microsoft.keys_endpoint());
    Arc::new(ResourceState {
        verifier: TokenVerifier::new(resolver),
    })
}

async fn run_portal(config: &Config) -> entra_portal::Result<()> {
    portal::serve(build_portal_state(config), config.portal.socket_addr()?).await
}

async fn run_resource(config: &Config) -> entra_portal::Result<()> {
    resource::serve(build_resource_state(config), config.resource.socket_addr()?).await
}

async fn run_both(config: &Config) -> entra_portal::Result<()> {
    info!(
        portal = %config.portal.port,
        resource = %config.resource.port,
        "starting portal and resource API"
    );
    tokio::try_join!(run_portal(config), run_resource(config))?;
    Ok(())
}
