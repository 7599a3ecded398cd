//! Bootstrap state machine: `Uninitialized -> [Challenge] -> Extract -> Ready`.
//!
//! Each state is handled by its own step, and the driving loop below only
//! decides which step runs next. No step mutates state it doesn't own.

use regex::Regex;
use reqwest::StatusCode;

use crate::constants::{CHALLENGE_MARKER, LANDING_PATH};
use crate::errors::{AppError, AppResult};
use crate::fingerprint::FingerprintBundle;

use super::{Session, SessionState, TokenStore};

struct LandingResponse {
    status: StatusCode,
    body: String,
}

struct ChallengeForm {
    action: String,
    fields: Vec<(String, String)>,
}

/// Run the full bootstrap sequence against the session's client, leaving
/// the session in `Ready` state with a fresh token store on success.
pub async fn bootstrap(session: &Session, country: &str, ad_type: &str) -> AppResult<()> {
    tracing::debug!(country, ad_type, "bootstrapping session");
    session.set_state(SessionState::Uninitialized).await;
    let fingerprint = session.fingerprint().await;

    let mut response = fetch_landing(session, &fingerprint, country, ad_type).await?;
    let mut challenged = false;

    while is_challenge_response(&response) {
        if challenged {
            return Err(AppError::authentication_failed(
                "verification challenge did not resolve within one round",
            ));
        }
        challenged = true;
        tracing::info!(status = %response.status, "verification challenge encountered, submitting challenge form");
        session.set_state(SessionState::Challenge).await;

        let form = parse_challenge_form(&response.body).ok_or_else(|| {
            AppError::authentication_failed("challenge marker present but no challenge form found")
        })?;
        submit_challenge(session, &form).await?;
        response = fetch_landing(session, &fingerprint, country, ad_type).await?;
    }

    session.set_state(SessionState::Extract).await;
    let tokens = TokenStore::extract_from(&response.body)?;
    session.mark_ready(tokens).await;
    tracing::debug!("session bootstrap reached Ready state");
    Ok(())
}

fn is_challenge_response(response: &LandingResponse) -> bool {
    response.status == StatusCode::FORBIDDEN || response.body.contains(CHALLENGE_MARKER)
}

async fn fetch_landing(
    session: &Session,
    fingerprint: &FingerprintBundle,
    country: &str,
    ad_type: &str,
) -> AppResult<LandingResponse> {
    let url = format!("{}{LANDING_PATH}", session.base_url());
    let cookie_header = format!(
        "datr={}; wd={}; dpr={}",
        fingerprint.synthesize_datr(),
        fingerprint.viewport_cookie(),
        fingerprint.dpr_cookie()
    );

    let response = session
        .client
        .get(&url)
        .query(&[("country", country), ("ad_type", ad_type)])
        .headers(fingerprint.header_map())
        .header("cookie", cookie_header)
        .send()
        .await
        .map_err(|e| AppError::network_error(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::network_error(e.to_string()))?;

    Ok(LandingResponse { status, body })
}

fn parse_challenge_form(body: &str) -> Option<ChallengeForm> {
    let action_re = Regex::new(r#"<form[^>]*action="([^"]+)""#).ok()?;
    let action = action_re.captures(body)?.get(1)?.as_str().to_string();

    let input_re = Regex::new(r#"<input[^>]*name="([^"]+)"[^>]*value="([^"]*)"[^>]*>"#).ok()?;
    let fields: Vec<(String, String)> = input_re
        .captures_iter(body)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    Some(ChallengeForm { action, fields })
}

async fn submit_challenge(session: &Session, form: &ChallengeForm) -> AppResult<()> {
    let action = if form.action.starts_with("http") {
        form.action.clone()
    } else {
        format!("{}{}", session.base_url(), form.action)
    };

    session
        .client
        .post(&action)
        .form(&form.fields)
        .send()
        .await
        .map_err(|e| AppError::network_error(e.to_string()))?;
    Ok(())
}
