//! Purpose: Obtain and validate the bearer token a client presents on every call.
//! Exports: `AuthToken`, `Credential`, `AuthService`, `DEFAULT_AUTH_URL`.
//! Role: Runs once at client construction; never refreshes or re-validates.
//! Invariants: Any validation failure is a `Construction` error; its cause kind is
//!             `Authorization` (rejected) or `Transport`/`Protocol` (service unusable).
//! Invariants: Token text never appears in `Debug` output or logs.
#![allow(clippy::result_large_err)]

use super::error::{Error, ErrorKind};
use super::transport::{Transport, transport_error};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use url::Url;

pub const DEFAULT_AUTH_URL: &str = "https://kbase.us/services/auth/";

const VALIDATE_PATH: &str = "api/V2/token";
const LOGIN_PATH: &str = "api/legacy/KBase/Sessions/Login";

/// A validated token and the identity it was issued to.
#[derive(Clone, Eq, PartialEq)]
pub struct AuthToken {
    token: String,
    user: String,
}

impl AuthToken {
    pub fn new(token: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: user.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

/// What a client is constructed with.
#[derive(Clone, Default)]
pub enum Credential {
    #[default]
    Anonymous,
    Token(String),
    UserPassword {
        user: String,
        password: String,
    },
}

impl Credential {
    pub fn token(token: impl Into<String>) -> Self {
        Self::Token(token.into())
    }

    pub fn user_password(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self::UserPassword {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Anonymous => f.write_str("Anonymous"),
            Credential::Token(_) => f.write_str("Token(<redacted>)"),
            Credential::UserPassword { user, .. } => f
                .debug_struct("UserPassword")
                .field("user", user)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Deserialize)]
struct TokenInfo {
    user: String,
}

#[derive(Deserialize)]
struct LoginReply {
    token: String,
    user_id: String,
}

/// The auth-check service a credential is validated against.
#[derive(Clone, Debug)]
pub struct AuthService {
    base_url: Url,
}

impl AuthService {
    pub fn new(base_url: &str) -> Result<Self, Error> {
        let mut url = Url::parse(base_url).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid auth service url")
                .with_source(err)
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("auth service url must use http or https scheme"));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);
        Ok(Self { base_url: url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Turns a credential into a validated token, or `None` for anonymous clients.
    pub fn resolve(
        &self,
        transport: &Transport,
        credential: Credential,
    ) -> Result<Option<AuthToken>, Error> {
        let token = match credential {
            Credential::Anonymous => return Ok(None),
            Credential::Token(token) => self.validate(transport, &token)?,
            Credential::UserPassword { user, password } => {
                self.login(transport, &user, &password)?
            }
        };
        tracing::info!(user = %token.user(), "credential validated");
        Ok(Some(token))
    }

    pub fn validate(&self, transport: &Transport, token: &str) -> Result<AuthToken, Error> {
        if token.trim().is_empty() {
            return Err(construction(
                Error::new(ErrorKind::Authorization).with_message("token is empty"),
            ));
        }
        let url = self.endpoint(VALIDATE_PATH)?;
        let settings = transport.settings();
        settings.check_scheme(&url).map_err(construction)?;
        let response = transport
            .request(&settings, "GET", &url)
            .set("Accept", "application/json")
            .set("Authorization", &format!("Bearer {token}"))
            .call();
        let info: TokenInfo = read_reply(response, &url)?;
        Ok(AuthToken::new(token, info.user))
    }

    pub fn login(
        &self,
        transport: &Transport,
        user: &str,
        password: &str,
    ) -> Result<AuthToken, Error> {
        let url = self.endpoint(LOGIN_PATH)?;
        let settings = transport.settings();
        settings.check_scheme(&url).map_err(construction)?;
        let response = transport
            .request(&settings, "POST", &url)
            .set("Accept", "application/json")
            .send_form(&[
                ("user_id", user),
                ("password", password),
                ("fields", "token,user_id"),
            ]);
        let reply: LoginReply = read_reply(response, &url)?;
        Ok(AuthToken::new(reply.token, reply.user_id))
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid auth service url")
                .with_source(err)
        })
    }
}

fn construction(cause: Error) -> Error {
    let message = match cause.kind() {
        ErrorKind::Authorization => "credential rejected by auth service",
        _ => "could not validate credential",
    };
    Error::new(ErrorKind::Construction)
        .with_message(message)
        .with_source(cause)
}

fn read_reply<R>(response: Result<ureq::Response, ureq::Error>, url: &Url) -> Result<R, Error>
where
    R: DeserializeOwned,
{
    match response {
        Ok(resp) => {
            let body = resp.into_string().map_err(|err| {
                construction(
                    Error::new(ErrorKind::Transport)
                        .with_message("failed to read auth service response")
                        .with_source(err),
                )
            })?;
            serde_json::from_str(&body).map_err(|err| {
                construction(
                    Error::new(ErrorKind::Protocol)
                        .with_message("invalid auth service response")
                        .with_source(err),
                )
            })
        }
        Err(ureq::Error::Status(401 | 403, _)) => Err(construction(
            Error::new(ErrorKind::Authorization).with_message("credential rejected"),
        )),
        Err(ureq::Error::Status(code, _)) => Err(construction(
            Error::new(ErrorKind::Protocol)
                .with_message(format!("auth service returned status {code}")),
        )),
        Err(ureq::Error::Transport(err)) => Err(construction(transport_error(err, url))),
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthService, AuthToken, Credential};
    use crate::core::error::ErrorKind;
    use crate::core::transport::{Transport, TransportSettings};

    #[test]
    fn auth_url_gains_trailing_slash() {
        let service = AuthService::new("https://auth.example/services/auth").expect("service");
        assert_eq!(
            service.base_url().as_str(),
            "https://auth.example/services/auth/"
        );
        assert_eq!(
            service.endpoint(super::VALIDATE_PATH).expect("url").as_str(),
            "https://auth.example/services/auth/api/V2/token"
        );
    }

    #[test]
    fn auth_url_rejects_other_schemes() {
        let err = AuthService::new("ftp://auth.example/").expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn anonymous_resolves_without_network() {
        let service = AuthService::new("https://auth.invalid/").expect("service");
        let transport = Transport::new(TransportSettings::default());
        let token = service
            .resolve(&transport, Credential::Anonymous)
            .expect("anonymous");
        assert!(token.is_none());
    }

    #[test]
    fn http_auth_service_is_refused_by_default() {
        let service = AuthService::new("http://127.0.0.1:9/").expect("service");
        let transport = Transport::new(TransportSettings::default());
        let err = service
            .resolve(&transport, Credential::token("abc"))
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert_eq!(err.cause_kind(), Some(ErrorKind::Transport));
    }

    #[test]
    fn empty_token_is_rejected() {
        let service = AuthService::new("https://auth.invalid/").expect("service");
        let transport = Transport::new(TransportSettings::default());
        let err = service
            .resolve(&transport, Credential::token("  "))
            .expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Construction);
        assert_eq!(err.cause_kind(), Some(ErrorKind::Authorization));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let token = AuthToken::new("secret-token", "alice");
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("alice"));

        let credential = Credential::user_password("alice", "hunter2");
        assert!(!format!("{credential:?}").contains("hunter2"));
    }
}
