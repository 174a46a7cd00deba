//! Send notification activity

use pulldown_cmark::{html, Options, Parser};

use super::{ActivityContext, HttpEndpoint};
use crate::activity_names::activities;
use crate::activity_types::{ActivityReceipt, NotificationPayload, SendNotificationInput};

/// Activity name for registration and scheduling
pub const NAME: &str = activities::SEND_NOTIFICATION;

pub async fn activity(
    ctx: ActivityContext,
    endpoint: HttpEndpoint,
    input: SendNotificationInput,
) -> Result<ActivityReceipt, String> {
    ctx.trace_info(format!("Sending notification '{}'", input.subject));

    let payload = NotificationPayload {
        subject: input.subject,
        message: render_markdown(&input.message),
    };

    let receipt = endpoint
        .post_json(&payload)
        .await
        .map_err(|e| format!("Failed to send notification: {}", e))?;

    ctx.trace_info("Notification sent successfully");
    Ok(receipt)
}

/// Renders Markdown to an HTML fragment
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_render_markdown() {
        assert_eq!(render_markdown("**Hi** there"), "<p><strong>Hi</strong> there</p>\n");
        assert_eq!(render_markdown("# Title"), "<h1>Title</h1>\n");
    }

    #[tokio::test]
    async fn test_posts_rendered_html() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({
                "subject": "Welcome",
                "message": "<p><em>Thanks</em> for reaching out</p>\n"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = HttpEndpoint::new(reqwest::Client::new(), server.uri());
        let input = SendNotificationInput {
            subject: "Welcome".to_string(),
            message: "*Thanks* for reaching out".to_string(),
        };

        let receipt = activity(ActivityContext::new("lead-1", NAME, 1), endpoint, input)
            .await
            .unwrap();
        assert_eq!(receipt.status_code, 200);
    }
}
