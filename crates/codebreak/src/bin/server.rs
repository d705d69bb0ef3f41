//! Standalone Codebreak server with a development authenticator that
//! accepts any numeric token as a player id. Front a real identity
//! provider before exposing this to the internet.

use codebreak::prelude::*;
use tracing_subscriber::EnvFilter;

struct TokenAuth;

impl Authenticator for TokenAuth {
    async fn authenticate(
        &self,
        token: &str,
    ) -> Result<PlayerId, ConnectionError> {
        token.parse().map(PlayerId).map_err(|_| {
            ConnectionError::AuthFailed("token must be a number".into())
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:8080".to_string());

    let server = ServerBuilder::new().bind(&addr).build(TokenAuth).await?;
    tracing::info!(addr = %server.local_addr()?, "codebreak server listening");

    server.run().await?;
    Ok(())
}
