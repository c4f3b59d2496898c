//! Report delivery: HTML email over SMTP, or plain console output.

use async_trait::async_trait;
use lettre::message::{header::ContentType, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use autopilot_agents::{AgentError, AgentResult, Reporter, RunReport};

use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Render a run as an HTML email body.
pub fn format_report_html(report: &RunReport) -> String {
    let mut html = String::from("<h1>Sprint Autopilot - Daily Sprint Report</h1>");
    html.push_str(&format!(
        "<p>Sprint: {} (id {})</p>",
        escape_html(&report.sprint.name),
        report.sprint.id
    ));
    html.push_str(&format!(
        "<p>Report generated on: {}</p><hr>",
        report.generated_at.format("%Y-%m-%d %H:%M:%S")
    ));

    for (agent, body) in report.by_agent() {
        html.push_str(&format!("<h2>- {} Summary -</h2>", escape_html(&agent)));
        html.push_str(&format!("<p>{}</p>", escape_html(&body).replace('\n', "<br>")));
    }

    if !report.undelivered.is_empty() {
        html.push_str("<h2>- Undelivered signals -</h2><ul>");
        for message in &report.undelivered {
            html.push_str(&format!(
                "<li>[{}] {}: {}</li>",
                message.topic,
                escape_html(&message.sender),
                escape_html(&message.content)
            ));
        }
        html.push_str("</ul>");
    }

    html
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Prints the markdown report to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

#[async_trait]
impl Reporter for ConsoleReporter {
    async fn send(&self, report: &RunReport) -> AgentResult<()> {
        println!("{}", report.render_markdown());
        Ok(())
    }
}

/// SMTP settings for the email report.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub sender: String,
    pub password: String,
    pub recipient: String,
}

impl SmtpConfig {
    pub fn new(sender: impl Into<String>, password: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            host: DEFAULT_SMTP_HOST.to_string(),
            port: DEFAULT_SMTP_PORT,
            sender: sender.into(),
            password: password.into(),
            recipient: recipient.into(),
        }
    }

    pub fn with_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }
}

/// Emails the report as HTML via STARTTLS.
pub struct EmailReporter {
    config: SmtpConfig,
}

impl EmailReporter {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build the email without sending it.
    pub fn build_message(&self, report: &RunReport) -> ServiceResult<Message> {
        let subject = format!(
            "Sprint Autopilot Daily Report - {}",
            report.generated_at.format("%Y-%m-%d")
        );

        Message::builder()
            .from(
                self.config
                    .sender
                    .parse()
                    .map_err(|e| ServiceError::Email(format!("Invalid sender address: {}", e)))?,
            )
            .to(self
                .config
                .recipient
                .parse()
                .map_err(|e| ServiceError::Email(format!("Invalid recipient address: {}", e)))?)
            .subject(subject)
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(format_report_html(report)),
            )
            .map_err(|e| ServiceError::Email(format!("Failed to build email: {}", e)))
    }

    async fn deliver(&self, report: &RunReport) -> ServiceResult<()> {
        let email = self.build_message(report)?;
        let creds = Credentials::new(self.config.sender.clone(), self.config.password.clone());

        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.host)
                .map_err(|e| ServiceError::Email(format!("SMTP relay error: {}", e)))?
                .port(self.config.port)
                .credentials(creds)
                .build();

        mailer
            .send(email)
            .await
            .map_err(|e| ServiceError::Email(format!("Failed to send email: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl Reporter for EmailReporter {
    async fn send(&self, report: &RunReport) -> AgentResult<()> {
        match self.deliver(report).await {
            Ok(()) => {
                info!(recipient = %self.config.recipient, "Report emailed");
                Ok(())
            }
            Err(e) => {
                warn!(recipient = %self.config.recipient, "Report email failed: {}", e);
                Err(AgentError::Notification(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autopilot_agents::mock::{InMemoryTracker, RecordingReporter};
    use autopilot_agents::{AgentHandler, Orchestrator, QaReleaseAgent, RunContext};
    use autopilot_core::{KnowledgeStore, MessageBroker, SprintInfo, Ticket, TicketStatus};
    use std::sync::Arc;

    async fn sample_report() -> RunReport {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let broker = MessageBroker::new();
        let sprint = SprintInfo::new(5, "Sprint <5>");
        let tracker = Arc::new(InMemoryTracker::new().with_tickets(
            autopilot_agents::TicketQuery::InReview,
            vec![Ticket::new("SM-1", "Fix a & b", TicketStatus::InReview)],
        ));
        let stages: Vec<Arc<dyn AgentHandler>> = vec![Arc::new(QaReleaseAgent::new(tracker))];
        Orchestrator::new(stages)
            .unwrap()
            .with_reporter(Arc::new(RecordingReporter::new()))
            .run(&RunContext::new(&store, &broker, &sprint))
            .await
    }

    #[tokio::test]
    async fn test_html_has_section_per_agent() {
        let report = sample_report().await;
        let html = format_report_html(&report);

        assert!(html.starts_with("<h1>"));
        assert!(html.contains("<h2>- QA &amp; Release Agent Summary -</h2>"));
        assert!(html.contains("Sprint &lt;5&gt;"));
        assert!(html.contains("Fix a &amp; b"));
        assert!(html.contains("<br>"));
    }

    #[tokio::test]
    async fn test_email_message_builds() {
        let report = sample_report().await;
        let reporter = EmailReporter::new(SmtpConfig::new("bot@example.com", "secret", "team@example.com"));
        assert!(reporter.build_message(&report).is_ok());

        let bad = EmailReporter::new(SmtpConfig::new("not an address", "secret", "team@example.com"));
        assert!(matches!(bad.build_message(&report), Err(ServiceError::Email(_))));
    }

    #[test]
    fn test_smtp_defaults() {
        let config = SmtpConfig::new("a@example.com", "pw", "b@example.com");
        assert_eq!(config.host, "smtp.gmail.com");
        assert_eq!(config.port, 587);
        assert_eq!(config.with_server("localhost", 2525).port, 2525);
    }
}
