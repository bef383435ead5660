use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{
    db::ReferenceStore,
    domain::{ProcessingRequest, Recipients},
    error::NotificationError,
};

use super::{
    mailer::{Mailer, OutboundEmail},
    template::{escape_html, replace_placeholders, strip_tags},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientClass {
    Admin,
    Client,
    Custom(String),
}

impl RecipientClass {
    pub fn expand(recipients: &Recipients) -> Vec<RecipientClass> {
        let mut classes = Vec::new();
        if recipients.admin {
            classes.push(RecipientClass::Admin);
        }
        if recipients.client {
            classes.push(RecipientClass::Client);
        }
        classes.extend(recipients.custom.iter().cloned().map(RecipientClass::Custom));
        classes
    }
}

pub struct NotificationDispatcher {
    store: Arc<dyn ReferenceStore>,
    mailer: Arc<dyn Mailer>,
    admin_email: String,
    timezone: Tz,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn ReferenceStore>,
        mailer: Arc<dyn Mailer>,
        admin_email: String,
        timezone: Tz,
    ) -> Self {
        Self {
            store,
            mailer,
            admin_email,
            timezone,
        }
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    /// Clients without an address on file fall back to the admin address.
    pub fn resolve_address(&self, class: &RecipientClass, request: &ProcessingRequest) -> String {
        match class {
            RecipientClass::Admin => self.admin_email.clone(),
            RecipientClass::Client if request.client.email.trim().is_empty() => {
                self.admin_email.clone()
            }
            RecipientClass::Client => request.client.email.trim().to_string(),
            RecipientClass::Custom(address) => address.trim().to_string(),
        }
    }

    /// Sends `template` to every configured recipient class. True when at least one send went out.
    /// `now` is rendered as the request time.
    pub async fn dispatch(
        &self,
        template: &str,
        recipients: &Recipients,
        request: &ProcessingRequest,
        now: DateTime<Utc>,
    ) -> bool {
        let mut delivered = false;
        for class in RecipientClass::expand(recipients) {
            if self.send_template(template, &class, request, now).await {
                delivered = true;
            }
        }
        delivered
    }

    pub async fn send_template(
        &self,
        template: &str,
        class: &RecipientClass,
        request: &ProcessingRequest,
        now: DateTime<Utc>,
    ) -> bool {
        let to = self.resolve_address(class, request);
        match self.try_send_template(template, &to, request, now).await {
            Ok(()) => {
                tracing::info!(
                    target: "notify",
                    subscriber = %request.subscriber,
                    template,
                    to = %to,
                    url = %request.url,
                    "notification sent"
                );
                true
            }
            Err(err) => {
                tracing::error!(
                    target: "notify",
                    subscriber = %request.subscriber,
                    request_id = ?request.request_id,
                    template,
                    to = %to,
                    error = %err,
                    "notification failed"
                );
                false
            }
        }
    }

    async fn try_send_template(
        &self,
        template: &str,
        to: &str,
        request: &ProcessingRequest,
        now: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        let stored = self
            .store
            .email_template(template)
            .await
            .map_err(|err| NotificationError::Build(err.to_string()))?
            .ok_or_else(|| NotificationError::TemplateMissing(template.to_string()))?;

        let request_id = request
            .request_id
            .map(|id| id.to_string())
            .unwrap_or_default();
        let request_time = now
            .with_timezone(&self.timezone)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let context = [
            ("request_id", request_id.as_str()),
            ("client_name", request.client.full_name.as_str()),
            ("client_email", request.client.email.as_str()),
            ("admin_email", self.admin_email.as_str()),
            ("domain_requested", request.url.as_str()),
            ("request_time", request_time.as_str()),
        ];
        let subject = replace_placeholders(&stored.subject, context);
        let escaped = context.map(|(placeholder, value)| (placeholder, escape_html(value)));
        let html = replace_placeholders(
            &stored.html,
            escaped.iter().map(|(placeholder, value)| (*placeholder, value.as_str())),
        );
        self.send_rendered(to, subject, html).await
    }

    /// Delivers an already rendered HTML message.
    pub async fn send_rendered(
        &self,
        to: &str,
        subject: String,
        html: String,
    ) -> Result<(), NotificationError> {
        let text = strip_tags(&html);
        self.mailer
            .send(OutboundEmail {
                to: to.to_string(),
                subject,
                html,
                text,
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{SubscriberId, SubscriberInfo},
        testing::{FakeMailer, FakeStore, NOW_MS},
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(NOW_MS).unwrap()
    }

    fn dispatcher(store: FakeStore, mailer: FakeMailer) -> NotificationDispatcher {
        NotificationDispatcher::new(
            Arc::new(store),
            Arc::new(mailer),
            "admin@example.com".into(),
            chrono_tz::UTC,
        )
    }

    fn request(email: &str) -> ProcessingRequest {
        ProcessingRequest::new(SubscriberId::new("12"), "http://a.example/x")
            .with_request_id(5)
            .with_client(SubscriberInfo {
                full_name: "Dana".into(),
                email: email.into(),
            })
    }

    #[tokio::test]
    async fn renders_context_and_falls_back_to_admin() {
        let store = FakeStore::new().with_template(
            "notice",
            "Request {request_id}",
            "<p>{client_name} asked for {domain_requested}</p>",
        );
        let mailer = FakeMailer::new();
        let dispatcher = dispatcher(store, mailer.clone());
        let recipients = Recipients {
            admin: false,
            client: true,
            custom: vec!["ops@example.com".into()],
        };

        assert!(dispatcher.dispatch("notice", &recipients, &request(""), now()).await);

        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, "admin@example.com");
        assert_eq!(sent[0].subject, "Request 5");
        assert_eq!(sent[0].html, "<p>Dana asked for http://a.example/x</p>");
        assert_eq!(sent[0].text, "Dana asked for http://a.example/x");
        assert_eq!(sent[1].to, "ops@example.com");
    }

    #[tokio::test]
    async fn html_values_are_escaped_and_time_comes_from_caller() {
        let store = FakeStore::new().with_template(
            "notice",
            "{client_name} at {request_time}",
            "<p>{client_name} asked for {domain_requested}</p>",
        );
        let mailer = FakeMailer::new();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(store),
            Arc::new(mailer.clone()),
            "admin@example.com".into(),
            chrono_tz::Asia::Jerusalem,
        );
        let request = ProcessingRequest::new(SubscriberId::new("12"), "http://a.example/?q=<b>")
            .with_client(SubscriberInfo {
                full_name: "{domain_requested}<script>x</script>".into(),
                email: String::new(),
            });
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        let recipients = Recipients {
            admin: true,
            ..Recipients::default()
        };

        assert!(dispatcher.dispatch("notice", &recipients, &request, at).await);

        let sent = mailer.sent();
        assert_eq!(
            sent[0].html,
            "<p>{domain_requested}&lt;script&gt;x&lt;/script&gt; asked for http://a.example/?q=&lt;b&gt;</p>"
        );
        assert_eq!(
            sent[0].subject,
            "{domain_requested}<script>x</script> at 2024-01-01 12:00:00"
        );
    }

    #[tokio::test]
    async fn missing_template_reports_false() {
        let mailer = FakeMailer::new();
        let dispatcher = dispatcher(FakeStore::new(), mailer.clone());
        let recipients = Recipients {
            admin: true,
            ..Recipients::default()
        };
        assert!(!dispatcher.dispatch("absent", &recipients, &request("c@example.com"), now()).await);
        assert!(mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn one_failed_send_does_not_hide_another_success() {
        let store = FakeStore::new().with_template("notice", "s", "b");
        let mailer = FakeMailer::new().failing_for("bad@example.com");
        let dispatcher = dispatcher(store, mailer.clone());
        let recipients = Recipients {
            admin: false,
            client: false,
            custom: vec!["bad@example.com".into(), "good@example.com".into()],
        };
        assert!(dispatcher.dispatch("notice", &recipients, &request(""), now()).await);
        assert_eq!(mailer.sent().len(), 1);
    }
}
