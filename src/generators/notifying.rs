use crate::events::{Attributes, XmlConsumer, XmlEvent};
use crate::pipeline::context::SetupContext;
use crate::pipeline::error_handler::Notification;
use crate::pipeline::stage::{Generator, Stage};
use anyhow::anyhow;

/// Renders a failure notification as a small document
///
/// ```text
/// <notify type="error">
///   <title/> <message/> <description/>
///   <extra description="cause">...</extra>*
///   <extra description="location">...</extra>?
/// </notify>
/// ```
///
/// Inside an error pipeline it renders the failure being handled; elsewhere
/// it renders its `title`, `message` and `description` parameters.
pub struct NotifyingGenerator {
    notification: Option<Notification>,
}

impl NotifyingGenerator {
    pub fn new() -> Self {
        NotifyingGenerator { notification: None }
    }
}

impl Default for NotifyingGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn text_element(name: &str, attributes: Attributes, text: &str, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
    consumer.event(XmlEvent::start_with(name, attributes))?;
    if !text.is_empty() {
        consumer.event(XmlEvent::text(text))?;
    }
    consumer.event(XmlEvent::end(name))
}

impl Stage for NotifyingGenerator {
    fn name(&self) -> &str {
        "notifying"
    }

    fn setup(&mut self, ctx: &SetupContext<'_>) -> anyhow::Result<()> {
        let notification = match ctx.notification {
            Some(notification) => notification.clone(),
            None => {
                let parameters = ctx.parameters;
                let title = parameters
                    .get("title")
                    .ok_or_else(|| anyhow!("no failure to render and no 'title' parameter"))?;
                let message = parameters.get_or("message", title);
                Notification {
                    kind: parameters.get_or("type", "notice").to_string(),
                    title: title.to_string(),
                    message: message.to_string(),
                    description: parameters.get_or("description", message).to_string(),
                    causes: Vec::new(),
                    location: None,
                }
            }
        };
        self.notification = Some(notification);
        Ok(())
    }

    fn recycle(&mut self) -> anyhow::Result<()> {
        self.notification = None;
        Ok(())
    }
}

impl Generator for NotifyingGenerator {
    fn generate(&mut self, consumer: &mut dyn XmlConsumer) -> anyhow::Result<()> {
        let notification = self
            .notification
            .as_ref()
            .ok_or_else(|| anyhow!("notifying generator used before setup"))?;

        consumer.event(XmlEvent::StartDocument)?;
        consumer.event(XmlEvent::start_with(
            "notify",
            Attributes::new().with("type", notification.kind.as_str()),
        ))?;
        text_element("title", Attributes::new(), &notification.title, consumer)?;
        text_element("message", Attributes::new(), &notification.message, consumer)?;
        text_element("description", Attributes::new(), &notification.description, consumer)?;
        for cause in &notification.causes {
            text_element("extra", Attributes::new().with("description", "cause"), cause, consumer)?;
        }
        if let Some(location) = &notification.location {
            text_element("extra", Attributes::new().with("description", "location"), location, consumer)?;
        }
        consumer.event(XmlEvent::end("notify"))?;
        consumer.event(XmlEvent::EndDocument)
    }
}
