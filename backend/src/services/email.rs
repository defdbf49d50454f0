//! Outbound email: SMTP transport, transactional templates, broadcast tally.
//!
//! All sends go through the [`Mailer`] trait so broadcast accounting and
//! notification dispatch can be exercised without a live SMTP server.

use crate::config::SmtpConfig;
use crate::validation::is_valid_email;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::{PoolConfig, authentication::Credentials},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid recipient address: {0}")]
    InvalidRecipient(String),
    #[error("invalid sender address: {0}")]
    InvalidSender(String),
    #[error("smtp transport error: {0}")]
    Transport(String),
    #[error("message build error: {0}")]
    Message(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// Sending seam. The production implementation is [`SmtpMailer`]; tests use
/// a scripted mock.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        template: &EmailTemplate,
    ) -> Result<(), EmailError>;

    /// Probe transport connectivity without sending anything.
    async fn verify(&self) -> Result<(), EmailError>;
}

#[derive(Debug, Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    pub fn new(smtp_config: &SmtpConfig) -> Self {
        let creds = Credentials::new(smtp_config.username.clone(), smtp_config.password.clone());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&smtp_config.host)
            .port(smtp_config.port)
            .credentials(creds)
            .pool_config(PoolConfig::new().max_size(10))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        SmtpMailer {
            transport,
            from_email: smtp_config.from_email.clone(),
            from_name: smtp_config.from_name.clone(),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        to_email: &str,
        to_name: Option<&str>,
        template: &EmailTemplate,
    ) -> Result<(), EmailError> {
        // Fail fast on a bad address before touching the transport.
        if !is_valid_email(to_email) {
            return Err(EmailError::InvalidRecipient(to_email.to_string()));
        }

        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| EmailError::InvalidSender(e.to_string()))?;

        let to = if let Some(name) = to_name {
            format!("{} <{}>", name, to_email)
                .parse::<Mailbox>()
                .map_err(|e| EmailError::InvalidRecipient(e.to_string()))?
        } else {
            to_email
                .parse::<Mailbox>()
                .map_err(|e| EmailError::InvalidRecipient(e.to_string()))?
        };

        let builder = Message::builder()
            .from(from)
            .to(to)
            .subject(&template.subject);

        let message = if let Some(text) = &template.text_body {
            builder
                .multipart(
                    MultiPart::alternative()
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_PLAIN)
                                .body(text.clone()),
                        )
                        .singlepart(
                            SinglePart::builder()
                                .header(ContentType::TEXT_HTML)
                                .body(template.html_body.clone()),
                        ),
                )
                .map_err(|e| EmailError::Message(e.to_string()))?
        } else {
            builder
                .header(ContentType::TEXT_HTML)
                .body(template.html_body.clone())
                .map_err(|e| EmailError::Message(e.to_string()))?
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Email sent successfully to {}", to_email);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {}", to_email, e);
                Err(EmailError::Transport(e.to_string()))
            }
        }
    }

    async fn verify(&self) -> Result<(), EmailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EmailError::Transport(
                "SMTP server rejected the connection".to_string(),
            )),
            Err(e) => Err(EmailError::Transport(e.to_string())),
        }
    }
}

/// Outcome of one recipient in a broadcast.
#[derive(Debug, Serialize)]
pub struct SendOutcome {
    pub email: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-recipient tally of a broadcast; never aborts on first failure.
#[derive(Debug, Serialize)]
pub struct BroadcastSummary {
    pub total_sent: usize,
    pub total_failed: usize,
    pub results: Vec<SendOutcome>,
}

pub async fn broadcast(
    mailer: &dyn Mailer,
    recipients: &[String],
    template: &EmailTemplate,
) -> BroadcastSummary {
    let mut results = Vec::with_capacity(recipients.len());
    let mut total_sent = 0;
    let mut total_failed = 0;

    for recipient in recipients {
        match mailer.send(recipient, None, template).await {
            Ok(()) => {
                total_sent += 1;
                results.push(SendOutcome {
                    email: recipient.clone(),
                    success: true,
                    error: None,
                });
            }
            Err(e) => {
                total_failed += 1;
                warn!("Broadcast send to {} failed: {}", recipient, e);
                results.push(SendOutcome {
                    email: recipient.clone(),
                    success: false,
                    error: Some(e.to_string()),
                });
            }
        }
    }

    BroadcastSummary {
        total_sent,
        total_failed,
        results,
    }
}

/// Fire-and-forget notification with its own failure channel: the spawned
/// task logs a failed send and never feeds back into the caller's result.
pub fn notify_detached(mailer: Arc<dyn Mailer>, to: String, template: EmailTemplate) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&to, None, &template).await {
            warn!("Detached notification to {} failed: {}", to, e);
        }
    });
}

// ==================== Templates ====================

pub mod templates {
    use super::EmailTemplate;
    use rust_decimal::Decimal;

    fn wrap_html(header_color: &str, title: &str, inner: &str) -> String {
        format!(
            r#"
            <html>
            <head>
                <style>
                    body {{ font-family: Arial, sans-serif; margin: 0; padding: 20px; background-color: #f5f5f5; }}
                    .container {{ max-width: 600px; margin: 0 auto; background: white; border-radius: 8px; overflow: hidden; box-shadow: 0 2px 10px rgba(0,0,0,0.1); }}
                    .header {{ background: {color}; color: white; padding: 20px; text-align: center; }}
                    .content {{ padding: 30px; }}
                    .info-box {{ background: #f8fafc; border-left: 4px solid {color}; padding: 15px; margin: 20px 0; }}
                    .footer {{ background: #f8fafc; padding: 20px; text-align: center; color: #666; }}
                    .btn {{ display: inline-block; background: {color}; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px; margin: 10px 0; }}
                </style>
            </head>
            <body>
                <div class="container">
                    <div class="header">
                        <h1>{title}</h1>
                    </div>
                    <div class="content">
                        {inner}
                    </div>
                    <div class="footer">
                        <p>This is an automated message. Please do not reply directly to this email.</p>
                    </div>
                </div>
            </body>
            </html>
            "#,
            color = header_color,
            title = title,
            inner = inner,
        )
    }

    pub fn welcome(name: &str) -> EmailTemplate {
        let subject = "Welcome to Upkeep Services".to_string();
        let inner = format!(
            "<p>Hello {name},</p>\
             <p>Your account has been created. You can now submit service requests \
             and track your annual maintenance contracts from your dashboard.</p>\
             <p>Best regards,<br>The Upkeep Team</p>"
        );
        let text_body = format!(
            "Welcome to Upkeep Services\n\n\
            Hello {name},\n\n\
            Your account has been created. You can now submit service requests and \
            track your annual maintenance contracts from your dashboard.\n\n\
            Best regards,\nThe Upkeep Team"
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#2563eb", "Welcome", &inner),
            text_body: Some(text_body),
        }
    }

    pub struct ContractNotificationData {
        pub contract_number: String,
        pub company_name: String,
        pub contact_person: String,
        pub contact_email: String,
        pub contact_phone: String,
        pub service_count: usize,
    }

    /// Admin notification sent after a contract submission commits.
    pub fn admin_contract_notification(data: &ContractNotificationData) -> EmailTemplate {
        let subject = format!(
            "New AMC Contract {} - {}",
            data.contract_number, data.company_name
        );
        let inner = format!(
            "<p>A new AMC contract has been submitted.</p>\
             <div class=\"info-box\">\
             <h3>Contract Details</h3>\
             <p><strong>Number:</strong> {}</p>\
             <p><strong>Company:</strong> {}</p>\
             <p><strong>Contact:</strong> {} ({}, {})</p>\
             <p><strong>Service lines:</strong> {}</p>\
             </div>\
             <p>Review it in the admin console.</p>",
            data.contract_number,
            data.company_name,
            data.contact_person,
            data.contact_email,
            data.contact_phone,
            data.service_count,
        );
        let text_body = format!(
            "New AMC Contract Submitted\n\n\
            Number: {}\nCompany: {}\nContact: {} ({}, {})\nService lines: {}\n\n\
            Review it in the admin console.",
            data.contract_number,
            data.company_name,
            data.contact_person,
            data.contact_email,
            data.contact_phone,
            data.service_count,
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#2563eb", "📋 New AMC Contract", &inner),
            text_body: Some(text_body),
        }
    }

    pub struct ServiceAssignedData {
        pub vendor_name: String,
        pub service_name: String,
        pub requester_name: String,
        pub requester_phone: String,
        pub address: String,
        pub requested_date: Option<String>,
    }

    /// Sent to a vendor when a service request is assigned to them.
    pub fn service_assigned(data: &ServiceAssignedData) -> EmailTemplate {
        let subject = format!("New Assignment - {}", data.service_name);
        let when = data.requested_date.as_deref().unwrap_or("to be scheduled");
        let inner = format!(
            "<p>Hello {},</p>\
             <p>You have been assigned a new service request.</p>\
             <div class=\"info-box\">\
             <p><strong>Service:</strong> {}</p>\
             <p><strong>Customer:</strong> {} ({})</p>\
             <p><strong>Address:</strong> {}</p>\
             <p><strong>Date:</strong> {}</p>\
             </div>",
            data.vendor_name,
            data.service_name,
            data.requester_name,
            data.requester_phone,
            data.address,
            when,
        );
        let text_body = format!(
            "New Assignment\n\n\
            Hello {},\n\n\
            Service: {}\nCustomer: {} ({})\nAddress: {}\nDate: {}\n",
            data.vendor_name,
            data.service_name,
            data.requester_name,
            data.requester_phone,
            data.address,
            when,
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#059669", "🔧 Service Assignment", &inner),
            text_body: Some(text_body),
        }
    }

    /// Contact-form submission forwarded to the admin address.
    pub fn contact_form(name: &str, email: &str, phone: Option<&str>, message: &str) -> EmailTemplate {
        let subject = format!("Contact form submission from {}", name);
        let phone_line = phone.unwrap_or("not provided");
        let inner = format!(
            "<div class=\"info-box\">\
             <p><strong>Name:</strong> {}</p>\
             <p><strong>Email:</strong> {}</p>\
             <p><strong>Phone:</strong> {}</p>\
             </div>\
             <p>{}</p>",
            name, email, phone_line, message,
        );
        let text_body = format!(
            "Contact form submission\n\nName: {}\nEmail: {}\nPhone: {}\n\n{}",
            name, email, phone_line, message
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#2563eb", "✉️ Contact Form", &inner),
            text_body: Some(text_body),
        }
    }

    /// Marketing broadcast body; subject and content come from the caller.
    pub fn marketing(subject: &str, body_html: &str) -> EmailTemplate {
        EmailTemplate {
            subject: subject.to_string(),
            html_body: wrap_html("#7c3aed", subject, body_html),
            text_body: None,
        }
    }

    pub fn otp(name: &str, code: &str) -> EmailTemplate {
        let subject = "Your verification code".to_string();
        let inner = format!(
            "<p>Hello {name},</p>\
             <p>Your one-time verification code is:</p>\
             <div class=\"info-box\"><h2>{code}</h2></div>\
             <p>The code expires in 10 minutes. If you did not request it, ignore this email.</p>"
        );
        let text_body = format!(
            "Hello {name},\n\nYour one-time verification code is: {code}\n\n\
            The code expires in 10 minutes. If you did not request it, ignore this email."
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#2563eb", "🔐 Verification Code", &inner),
            text_body: Some(text_body),
        }
    }

    pub fn password_reset(name: &str, reset_url: &str) -> EmailTemplate {
        let subject = "Reset your password".to_string();
        let inner = format!(
            "<p>Hello {name},</p>\
             <p>We received a request to reset your password.</p>\
             <a href=\"{reset_url}\" class=\"btn\">Reset Password</a>\
             <p>The link expires in 1 hour. If you did not request a reset, ignore this email.</p>"
        );
        let text_body = format!(
            "Hello {name},\n\nWe received a request to reset your password.\n\n\
            Reset it here: {reset_url}\n\n\
            The link expires in 1 hour. If you did not request a reset, ignore this email."
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#dc2626", "Password Reset", &inner),
            text_body: Some(text_body),
        }
    }

    pub struct PaymentLinkData {
        pub name: String,
        pub service_name: String,
        pub amount: Decimal,
        pub payment_url: String,
        pub expires_at: String,
    }

    pub fn payment_link(data: &PaymentLinkData) -> EmailTemplate {
        let subject = format!("Payment link for {}", data.service_name);
        let inner = format!(
            "<p>Hello {},</p>\
             <p>Your payment of <strong>{}</strong> for {} is ready.</p>\
             <a href=\"{}\" class=\"btn\">Pay Now</a>\
             <p>This link expires on {}.</p>",
            data.name, data.amount, data.service_name, data.payment_url, data.expires_at,
        );
        let text_body = format!(
            "Hello {},\n\nYour payment of {} for {} is ready.\n\n\
            Pay here: {}\n\nThis link expires on {}.",
            data.name, data.amount, data.service_name, data.payment_url, data.expires_at,
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#2563eb", "💳 Payment Link", &inner),
            text_body: Some(text_body),
        }
    }

    pub fn payment_success(name: &str, service_name: &str, amount: Decimal, reference: &str) -> EmailTemplate {
        let subject = format!("Payment received - {}", service_name);
        let inner = format!(
            "<p>Hello {name},</p>\
             <p>We have received your payment of <strong>{amount}</strong> for {service_name}.</p>\
             <div class=\"info-box\"><p><strong>Reference:</strong> {reference}</p></div>\
             <p>Thank you for your business.</p>"
        );
        let text_body = format!(
            "Hello {name},\n\nWe have received your payment of {amount} for {service_name}.\n\
            Reference: {reference}\n\nThank you for your business."
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#059669", "✅ Payment Received", &inner),
            text_body: Some(text_body),
        }
    }

    pub fn payment_failure(name: &str, service_name: &str, amount: Decimal, reason: &str) -> EmailTemplate {
        let subject = format!("Payment failed - {}", service_name);
        let inner = format!(
            "<p>Hello {name},</p>\
             <p>Your payment of <strong>{amount}</strong> for {service_name} could not be processed.</p>\
             <div class=\"info-box\"><p><strong>Reason:</strong> {reason}</p></div>\
             <p>Please try again or contact support.</p>"
        );
        let text_body = format!(
            "Hello {name},\n\nYour payment of {amount} for {service_name} could not be processed.\n\
            Reason: {reason}\n\nPlease try again or contact support."
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#dc2626", "❌ Payment Failed", &inner),
            text_body: Some(text_body),
        }
    }

    pub struct OrderConfirmationData {
        pub name: String,
        pub contract_number: String,
        pub service_names: Vec<String>,
        pub start_date: Option<String>,
        pub end_date: Option<String>,
    }

    /// Sent to the customer after their contract submission is accepted.
    pub fn order_confirmation(data: &OrderConfirmationData) -> EmailTemplate {
        let subject = format!("Contract {} confirmed", data.contract_number);
        let services = data
            .service_names
            .iter()
            .map(|s| format!("<li>{}</li>", s))
            .collect::<String>();
        let period = match (&data.start_date, &data.end_date) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => "to be confirmed".to_string(),
        };
        let inner = format!(
            "<p>Hello {},</p>\
             <p>Your maintenance contract <strong>{}</strong> has been received.</p>\
             <div class=\"info-box\">\
             <p><strong>Period:</strong> {}</p>\
             <p><strong>Services:</strong></p><ul>{}</ul>\
             </div>\
             <p>Our team will review it and follow up shortly.</p>",
            data.name, data.contract_number, period, services,
        );
        let text_services = data.service_names.join(", ");
        let text_body = format!(
            "Hello {},\n\nYour maintenance contract {} has been received.\n\
            Period: {}\nServices: {}\n\nOur team will review it and follow up shortly.",
            data.name, data.contract_number, period, text_services,
        );
        EmailTemplate {
            subject,
            html_body: wrap_html("#2563eb", "📄 Contract Confirmation", &inner),
            text_body: Some(text_body),
        }
    }
}
