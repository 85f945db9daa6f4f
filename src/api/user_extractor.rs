use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use log::debug;

use crate::model::{CredentialScope, UserContext, WorkspaceRole};

/// Axum extractor for UserContext from request headers
///
/// The gateway in front of the service authenticates the caller and sets:
/// - X-User-Id: Required user identifier
/// - X-User-Email: Optional user email, matched against membership rows
/// - X-User-Name: Optional user display name
/// - X-Workspace-Role: Optional `owner`, `admin` or `member`
/// - X-Credential-Scopes: Optional comma separated `project_read:<id>` / `project_write:<id>`
///
/// Requests without X-User-Id are rejected with 401.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;

        let user_id = extract_header_value(headers, "x-user-id").ok_or(StatusCode::UNAUTHORIZED)?;
        let user_email = extract_header_value(headers, "x-user-email");
        let user_name = extract_header_value(headers, "x-user-name");

        let mut user = UserContext::with_details(user_id, user_email, user_name);
        if let Some(role) = extract_header_value(headers, "x-workspace-role") {
            match WorkspaceRole::parse(&role) {
                Some(role) => user = user.with_workspace_role(role),
                None => debug!("ignoring unknown workspace role '{}'", role),
            }
        }
        user.credential_scopes = extract_header_value(headers, "x-credential-scopes")
            .map(|value| parse_scopes(&value))
            .unwrap_or_default();

        Ok(user)
    }
}

/// Extract header value as string
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_scopes(value: &str) -> Vec<CredentialScope> {
    value
        .split(',')
        .filter_map(|scope| {
            let parsed = CredentialScope::parse(scope);
            if parsed.is_none() {
                debug!("ignoring malformed credential scope '{}'", scope);
            }
            parsed
        })
        .collect()
}
