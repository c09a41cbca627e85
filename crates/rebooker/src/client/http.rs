//! reqwest implementation of [`SchedulingApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, LOCATION, USER_AGENT};
use reqwest::{redirect, Client, Response, StatusCode, Url};
use tracing::{debug, info, instrument, warn};

use super::payload::{self, BookingOutcome, BookingVerdict};
use super::session::{
    extract_csrf_token, Credentials, Session, SessionCookie, BROWSER_USER_AGENT,
};
use super::{SchedulingApi, Target};
use crate::error::BotError;
use crate::types::{AppointmentDate, TimeSlot};

const SIGN_IN_PAGE: &str = "sign_in_page";
const SIGN_IN: &str = "sign_in";
const AVAILABLE_DATES: &str = "available_dates";
const AVAILABLE_TIMES: &str = "available_times";
const APPOINTMENT_PAGE: &str = "appointment_page";
const BOOKING: &str = "booking";

/// Base URL of the site for a country/locale code, e.g. `ca` or `gb`.
pub fn base_uri(country_code: &str) -> String {
    format!("https://ais.usvisa-info.com/en-{}/niv", country_code)
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Upper bound for every request, including form submissions
    pub request_timeout: Duration,
    /// Pause before a booking submission to stay under the site's rate limit
    pub submit_delay: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            submit_delay: Duration::from_secs(1),
        }
    }
}

/// HTTP client for the scheduling site.
#[derive(Clone)]
pub struct VisaClient {
    http: Client,
    /// Does not follow redirects, so the sign-in response's cookie is visible
    form_http: Client,
    base_url: String,
    submit_delay: Duration,
}

/// A server-rendered form page: its cookie (if any) and anti-forgery token.
struct FormPage {
    cookie: Option<SessionCookie>,
    csrf_token: String,
    final_url: Url,
}

impl VisaClient {
    pub fn new(base_url: impl Into<String>, options: ClientOptions) -> Result<Self, BotError> {
        let http = Client::builder()
            .timeout(options.request_timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| BotError::from_reqwest("client", e))?;

        let form_http = Client::builder()
            .timeout(options.request_timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| BotError::from_reqwest("client", e))?;

        Ok(Self {
            http,
            form_http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            submit_delay: options.submit_delay,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn anonymous_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }

    async fn fetch_form_page(
        &self,
        endpoint: &'static str,
        url: &str,
        headers: HeaderMap,
    ) -> Result<FormPage, BotError> {
        let response = self
            .http
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| BotError::from_reqwest(endpoint, e))?;
        check_status(endpoint, &response)?;

        let cookie = SessionCookie::from_set_cookie(response.headers());
        let final_url = response.url().clone();
        let html = response
            .text()
            .await
            .map_err(|e| BotError::from_reqwest(endpoint, e))?;

        if !html.contains('<') {
            return Err(BotError::protocol(endpoint, "response is not HTML"));
        }
        let csrf_token = extract_csrf_token(&html)
            .ok_or_else(|| BotError::auth(endpoint, "page carries no csrf-token meta tag"))?;

        Ok(FormPage {
            cookie,
            csrf_token,
            final_url,
        })
    }

    async fn get_json(
        &self,
        endpoint: &'static str,
        url: &str,
        query: &[(&str, &str)],
        session: &Session,
    ) -> Result<String, BotError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .headers(session.headers())
            .header(ACCEPT, "application/json")
            .header("x-requested-with", "XMLHttpRequest")
            .send()
            .await
            .map_err(|e| BotError::from_reqwest(endpoint, e))?;
        check_status(endpoint, &response)?;

        response
            .text()
            .await
            .map_err(|e| BotError::from_reqwest(endpoint, e))
    }
}

fn is_sign_in(url: &Url) -> bool {
    url.path().trim_end_matches('/').ends_with("/users/sign_in")
}

/// Map HTTP status codes onto the error taxonomy.
fn check_status(endpoint: &'static str, response: &Response) -> Result<(), BotError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(BotError::auth(
            endpoint,
            format!("session rejected (HTTP {})", status.as_u16()),
        ));
    }
    if status.is_server_error() {
        return Err(BotError::remote(
            endpoint,
            format!("server error (HTTP {})", status.as_u16()),
        ));
    }
    if status.is_client_error() {
        return Err(BotError::protocol(
            endpoint,
            format!("unexpected HTTP {}", status.as_u16()),
        ));
    }
    Ok(())
}

#[async_trait]
impl SchedulingApi for VisaClient {
    #[instrument(skip_all, level = "debug")]
    async fn login(&self, credentials: &Credentials) -> Result<Session, BotError> {
        info!("Logging in");

        let sign_in = self.url("/users/sign_in");
        let page = self
            .fetch_form_page(SIGN_IN_PAGE, &sign_in, Self::anonymous_headers())
            .await?;
        let anonymous_cookie = page
            .cookie
            .ok_or_else(|| BotError::auth(SIGN_IN_PAGE, "sign-in page set no session cookie"))?;
        let anonymous = Session::new(anonymous_cookie, page.csrf_token, self.base_url.clone());

        let form = [
            ("utf8", "✓"),
            ("user[email]", credentials.email.as_str()),
            ("user[password]", credentials.password()),
            ("policy_confirmed", "1"),
            ("commit", "Sign In"),
        ];

        let response = self
            .form_http
            .post(&sign_in)
            .headers(anonymous.headers())
            .form(&form)
            .send()
            .await
            .map_err(|e| BotError::from_reqwest(SIGN_IN, e))?;

        let status = response.status();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(BotError::auth(SIGN_IN, "credentials rejected (HTTP 422)"));
        }
        check_status(SIGN_IN, &response)?;

        // A failed sign-in may also bounce back to the form with a fresh
        // anonymous cookie instead of answering 422
        if status.is_redirection() {
            let bounced = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|location| response.url().join(location).ok())
                .is_some_and(|url| is_sign_in(&url));
            if bounced {
                return Err(BotError::auth(
                    SIGN_IN,
                    "credentials rejected, redirected back to sign-in",
                ));
            }
        }

        let cookie = SessionCookie::from_set_cookie(response.headers());
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|e| BotError::from_reqwest(SIGN_IN, e))?;
            if body.contains("user[password]") {
                return Err(BotError::auth(
                    SIGN_IN,
                    "credentials rejected, sign-in form rendered again",
                ));
            }
        }
        let cookie = cookie.ok_or_else(|| {
            BotError::auth(SIGN_IN, "sign-in response carried no session cookie")
        })?;

        debug!(status = status.as_u16(), "sign-in accepted");
        Ok(Session::new(
            cookie,
            anonymous.csrf_token().to_string(),
            self.base_url.clone(),
        ))
    }

    #[instrument(skip_all, fields(schedule = %target.schedule_id, facility = %target.facility_id), level = "debug")]
    async fn fetch_available_dates(
        &self,
        session: &Session,
        target: &Target,
    ) -> Result<Vec<AppointmentDate>, BotError> {
        let url = self.url(&format!(
            "/schedule/{}/appointment/days/{}.json",
            target.schedule_id, target.facility_id
        ));
        let body = self
            .get_json(
                AVAILABLE_DATES,
                &url,
                &[("appointments[expedite]", "false")],
                session,
            )
            .await?;

        payload::parse_dates(AVAILABLE_DATES, &body)
    }

    #[instrument(skip_all, fields(date = %date), level = "debug")]
    async fn fetch_available_time(
        &self,
        session: &Session,
        target: &Target,
        date: AppointmentDate,
    ) -> Result<Option<TimeSlot>, BotError> {
        let url = self.url(&format!(
            "/schedule/{}/appointment/times/{}.json",
            target.schedule_id, target.facility_id
        ));
        let date_param = date.to_string();
        let body = self
            .get_json(
                AVAILABLE_TIMES,
                &url,
                &[
                    ("date", date_param.as_str()),
                    ("appointments[expedite]", "false"),
                ],
                session,
            )
            .await?;

        Ok(payload::parse_times(AVAILABLE_TIMES, &body)?.preferred())
    }

    #[instrument(skip_all, fields(date = %date, time = %time), level = "debug")]
    async fn submit_booking(
        &self,
        session: &Session,
        target: &Target,
        date: AppointmentDate,
        time: &TimeSlot,
    ) -> Result<BookingOutcome, BotError> {
        tokio::time::sleep(self.submit_delay).await;

        let url = self.url(&format!("/schedule/{}/appointment", target.schedule_id));

        // Tokens are single use; every submission needs a fresh one
        let page = self
            .fetch_form_page(APPOINTMENT_PAGE, &url, session.headers())
            .await?;
        if is_sign_in(&page.final_url) {
            return Err(BotError::auth(
                APPOINTMENT_PAGE,
                "redirected to sign-in, session expired",
            ));
        }
        let booking_session = session.with_token(page.csrf_token);

        let date_param = date.to_string();
        let form = [
            ("utf8", "✓"),
            ("authenticity_token", booking_session.csrf_token()),
            ("confirmed_limit_message", "1"),
            ("use_consulate_appointment_capacity", "true"),
            (
                "appointments[consulate_appointment][facility_id]",
                target.facility_id.as_str(),
            ),
            ("appointments[consulate_appointment][date]", date_param.as_str()),
            ("appointments[consulate_appointment][time]", time.as_str()),
            ("appointments[asc_appointment][facility_id]", ""),
            ("appointments[asc_appointment][date]", ""),
            ("appointments[asc_appointment][time]", ""),
        ];

        info!("Submitting booking for {} {}...", date, time);
        let response = self
            .http
            .post(&url)
            .headers(booking_session.headers())
            .form(&form)
            .send()
            .await
            .map_err(|e| BotError::from_reqwest(BOOKING, e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(BotError::auth(
                BOOKING,
                format!("booking refused (HTTP {})", status.as_u16()),
            ));
        }

        let outcome = BookingOutcome::from_location(response.url().as_str());
        info!(
            status = status.as_u16(),
            location = %outcome.location,
            "Booking response received"
        );

        // The verdict is already decided; the body only adds a hint
        match response.text().await {
            Ok(body) if body.contains("error") || body.contains("Error") => {
                warn!("Possible error in booking response")
            }
            Ok(_) => {}
            Err(e) => debug!("could not read booking response body: {}", e),
        }

        match outcome.verdict {
            BookingVerdict::Confirmed => info!("Booking accepted, redirected to continue_actions"),
            BookingVerdict::Rejected => warn!("Still on appointment page, booking was not accepted"),
            BookingVerdict::Indeterminate => {
                warn!("Booking landed on an unexpected page: {}", outcome.location)
            }
        }

        Ok(outcome)
    }
}
