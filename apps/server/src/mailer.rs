//! Email notification collaborator.
//!
//! Talks to a SendGrid-compatible HTTP API. Every event send is best-effort:
//! callers on the booking path use the `notify_*` methods, which spawn the
//! request onto the runtime and only log failures; a mail outage must never
//! roll back or fail a booking. The reminder sweep awaits `deliver` directly
//! so it can count what actually went out.

use crate::models::{Appointment, Service, User};
use crate::time::{fmt_date_long, fmt_time_hm, parse_datetime};

const MAIL_API_URL: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Clone)]
pub struct Mailer {
    http: reqwest::Client,
    api_key: String,
    from_email: String,
    from_name: String,
    frontend_url: String,
}

impl Mailer {
    pub fn from_env() -> Self {
        let api_key = std::env::var("MAIL_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!("MAIL_API_KEY not set — email notifications are disabled");
        }
        Self {
            http: reqwest::Client::new(),
            api_key,
            from_email: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "no-reply@example.com".into()),
            from_name: std::env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "Verbena Studio".into()),
            frontend_url: std::env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: String::new(),
            from_email: "no-reply@example.com".into(),
            from_name: "Verbena Studio".into(),
            frontend_url: "https://studio.example.com".into(),
        }
    }

    /// Send one message, awaiting the API call. Disabled mailer is a no-op.
    pub async fn deliver(&self, to: &str, subject: &str, html: &str) -> anyhow::Result<()> {
        if self.api_key.is_empty() {
            tracing::debug!("mailer disabled, dropping '{}' to {}", subject, to);
            return Ok(());
        }

        let body = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from_email, "name": self.from_name },
            "subject": subject,
            "content": [{ "type": "text/html", "value": html }],
        });

        let resp = self
            .http
            .post(MAIL_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            anyhow::bail!("mail API returned {}", resp.status());
        }
        Ok(())
    }

    /// Fire-and-forget send; failures are logged and swallowed.
    fn spawn_send(&self, to: String, subject: String, html: String) {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.deliver(&to, &subject, &html).await {
                tracing::error!("failed to send '{}' to {}: {}", subject, to, e);
            }
        });
    }

    pub fn notify_welcome(&self, user: &User) {
        let html = format!(
            "<p>Hi {},</p>\
             <p>Welcome to {}! Your account is ready — you can browse services \
             and book your first appointment right away.</p>\
             <p><a href=\"{}/login\">Sign in</a></p>",
            user.full_name, self.from_name, self.frontend_url
        );
        self.spawn_send(user.email.clone(), format!("Welcome to {}", self.from_name), html);
    }

    pub fn notify_password_reset(&self, user: &User, reset_token: &str) {
        let html = format!(
            "<p>Hi {},</p>\
             <p>We received a request to reset your password. The link below is \
             valid for one hour.</p>\
             <p><a href=\"{}/reset-password?token={}\">Reset password</a></p>\
             <p>If you did not ask for this, you can ignore this email.</p>",
            user.full_name, self.frontend_url, reset_token
        );
        self.spawn_send(user.email.clone(), "Password reset".into(), html);
    }

    pub fn notify_confirmation(&self, appointment: &Appointment, user: &User, service: &Service) {
        let html = appointment_body(
            &user.full_name,
            "Your appointment is confirmed.",
            appointment,
            service,
            Some(&self.appointment_link(appointment.id)),
        );
        self.spawn_send(user.email.clone(), "Appointment confirmed".into(), html);
    }

    pub fn notify_cancellation(&self, appointment: &Appointment, user: &User, service: &Service) {
        let html = appointment_body(
            &user.full_name,
            "Your appointment has been cancelled.",
            appointment,
            service,
            None,
        );
        self.spawn_send(user.email.clone(), "Appointment cancelled".into(), html);
    }

    /// Reminder for tomorrow's appointment; awaited by the scheduler sweep.
    pub async fn deliver_reminder(
        &self,
        to: &str,
        client_name: &str,
        service_name: &str,
        start_time: &str,
        appointment_id: i64,
    ) -> anyhow::Result<()> {
        let when = parse_datetime(start_time)
            .map(|dt| format!("{} at {}", fmt_date_long(dt), fmt_time_hm(dt)))
            .unwrap_or_else(|| start_time.to_string());
        let html = format!(
            "<p>Hi {client_name},</p>\
             <p>A reminder that your <b>{service_name}</b> appointment is \
             tomorrow, {when}.</p>\
             <p><a href=\"{}\">View appointment</a></p>",
            self.appointment_link(appointment_id)
        );
        self.deliver(to, "Appointment reminder", &html).await
    }

    fn appointment_link(&self, appointment_id: i64) -> String {
        format!("{}/appointments/{}", self.frontend_url, appointment_id)
    }
}

fn appointment_body(
    client_name: &str,
    lead: &str,
    appointment: &Appointment,
    service: &Service,
    link: Option<&str>,
) -> String {
    let when = parse_datetime(&appointment.start_time)
        .map(|dt| format!("{} at {}", fmt_date_long(dt), fmt_time_hm(dt)))
        .unwrap_or_else(|| appointment.start_time.clone());
    let mut html = format!(
        "<p>Hi {client_name},</p>\
         <p>{lead}</p>\
         <ul>\
         <li><b>Service:</b> {}</li>\
         <li><b>When:</b> {when}</li>\
         <li><b>Duration:</b> {} minutes</li>\
         </ul>",
        service.name, service.duration_min
    );
    if let Some(link) = link {
        html.push_str(&format!("<p><a href=\"{link}\">View appointment</a></p>"));
    }
    html
}

// ── Tests ──
