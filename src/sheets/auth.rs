use std::path::Path;

use error_stack::{Context, Result, ResultExt};
use google_sheets4::oauth2::{self, authenticator::Authenticator};
use google_sheets4::{hyper, hyper_rustls};
use tracing::instrument;

use super::http_client::HttpsClient;

/// Access requested from the service: spreadsheet read/write and file
/// read/write, matching what the service account must be shared with.
pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

#[derive(Debug)]
pub enum AuthError {
    UnreadableServiceAccountKey,
    FailedToBuildAuthenticator,
    CredentialsRejected,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl Context for AuthError {}

/// Builds a service-account authenticator from the key file at `priv_key_path`
/// and proves it against the remote service by requesting a token for the
/// fixed scopes.
#[instrument(skip(client))]
pub async fn auth(
    priv_key_path: &Path,
    client: HttpsClient,
) -> Result<Authenticator<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>, AuthError> {
    let secret: oauth2::ServiceAccountKey = oauth2::read_service_account_key(priv_key_path)
        .await
        .change_context(AuthError::UnreadableServiceAccountKey)
        .attach_printable_lazy(|| {
            format!(
                "could not read service account private key at '{}'",
                priv_key_path.display()
            )
        })?;

    let authenticator = oauth2::ServiceAccountAuthenticator::with_client(secret, client)
        .build()
        .await
        .change_context(AuthError::FailedToBuildAuthenticator)?;

    authenticator
        .token(&SCOPES)
        .await
        .change_context(AuthError::CredentialsRejected)
        .attach_printable_lazy(|| format!("token request failed for scopes {:?}", SCOPES))?;

    Ok(authenticator)
}
