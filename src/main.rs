use log::{error, info, warn};
use oidc_client::{Callback, Client};
use service::{config::Config, logging::Logger};
use tokio::io::{AsyncBufReadExt, BufReader};

/// The query part of a pasted redirect URL, or the input itself when it is a bare query.
fn callback_query(redirect: &str) -> &str {
    let redirect = redirect.trim();
    let without_fragment = redirect.split('#').next().unwrap_or(redirect);
    match without_fragment.split_once('?') {
        Some((_, query)) => query,
        None => without_fragment,
    }
}

async fn read_redirect() -> std::io::Result<String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    Ok(lines.next_line().await?.unwrap_or_default())
}

#[tokio::main]
async fn main() {
    let config = Config::new();
    if let Err(e) = Logger::init_logger(&config) {
        eprintln!("Failed to start logging: {e}");
    }

    let client_config = match config.client_config() {
        Ok(client_config) => client_config,
        Err(e) => {
            error!("Invalid client configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(
        "Using identity provider {} ({} environment)",
        config.oidc_provider_url,
        config.runtime_env()
    );
    let mut client = Client::new(client_config);

    let url = match client
        .build_authorization_url(&config.oidc_base_uri, None)
        .await
    {
        Ok(url) => url,
        Err(e) => {
            error!("Failed to build the authorization URL: {e}");
            std::process::exit(1);
        }
    };

    println!("Open this URL in a browser to sign in:\n\n{url}\n");
    println!("Then paste the full URL the provider redirected you to:");

    let redirect = match read_redirect().await {
        Ok(redirect) => redirect,
        Err(e) => {
            error!("Failed to read the redirect URL: {e}");
            std::process::exit(1);
        }
    };

    let callback = Callback::from_query(callback_query(&redirect));
    let tokens = match client.exchange(&callback, None).await {
        Ok(tokens) => tokens,
        Err(e) => {
            error!("Authorization failed: {e}");
            std::process::exit(1);
        }
    };

    match client.get_identity(&tokens, None).await {
        Ok(Some(identity)) => {
            info!("Signed in as {}", identity.user_id());
            for claim in &identity.claims {
                println!("{}: {}", claim.name, claim.value);
            }
        }
        Ok(None) => {
            warn!("The ID token did not identify the expected user");
            std::process::exit(1);
        }
        Err(e) => {
            error!("Failed to verify the sign in: {e}");
            std::process::exit(1);
        }
    }
}
