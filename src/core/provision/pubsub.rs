use crate::core::provider::Resource;

use super::StepContext;

/// Seconds the load queue has to acknowledge a pulled batch.
pub const LOAD_QUEUE_ACK_DEADLINE_SEC: u32 = 600;
pub const SMTP_ACK_DEADLINE_SEC: u32 = 60;
pub const MESSAGE_RETENTION: &str = "7d";

pub fn resources(ctx: &StepContext<'_>) -> Vec<Resource> {
    let topics = &ctx.resources.topics;
    let topic = |name: &str| Resource::Topic {
        name: name.to_string(),
    };
    let subscription = |name: &str, topic: &str, ack_deadline_sec: u32| Resource::Subscription {
        name: name.to_string(),
        topic: topic.to_string(),
        ack_deadline_sec,
        retention: MESSAGE_RETENTION.to_string(),
    };

    let mut resources: Vec<Resource> = [
        &topics.new,
        &topics.load_queue_trigger,
        &topics.pick_notifications_trigger,
        &topics.updated,
        &topics.updated_urls,
        &topics.archive_trigger,
        &topics.cost_mon_trigger,
    ]
    .into_iter()
    .map(|name| topic(name))
    .collect();
    resources.push(subscription(
        &ctx.resources.load_queue_subscription,
        &topics.new,
        LOAD_QUEUE_ACK_DEADLINE_SEC,
    ));

    if ctx.features.smtp_mocked {
        let smtp = &ctx.resources.smtp_queue;
        resources.push(topic(&smtp.topic));
        resources.push(subscription(
            &smtp.subscription,
            &smtp.topic,
            SMTP_ACK_DEADLINE_SEC,
        ));
    }
    resources
}
