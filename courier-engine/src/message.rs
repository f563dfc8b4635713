//! Outbound message assembly.
//!
//! No templating here (that lives in the CRM's preview tooling); the engine
//! only assembles the stored subject/body with the per-recipient
//! unsubscribe link and the correlation args the provider echoes back in
//! its events.

use courier_common::RecipientId;
use courier_store::{Campaign, Recipient, SequenceStep};

use crate::{config::EngineConfig, transport::OutboundMessage};

fn unsubscribe_link(base_url: &str, recipient_id: RecipientId) -> String {
    format!("{base_url}?recipient={recipient_id}")
}

fn html_with_footer(body: &str, link: &str) -> String {
    format!("{body}\n<p><a href=\"{link}\">Unsubscribe</a></p>")
}

fn text_with_footer(body: &str, link: &str) -> String {
    format!("{body}\n\nUnsubscribe: {link}")
}

pub(crate) fn build_campaign_message(
    campaign: &Campaign,
    recipient: &Recipient,
    address: &courier_common::EmailAddress,
    config: &EngineConfig,
) -> OutboundMessage {
    let link = unsubscribe_link(&config.unsubscribe_base_url, recipient.id);
    OutboundMessage {
        to: address.clone(),
        from: campaign.from.clone(),
        reply_to: campaign.reply_to.clone(),
        subject: campaign.subject.clone(),
        html: html_with_footer(&campaign.body, &link),
        text: text_with_footer(&campaign.body, &link),
        custom_args: vec![
            ("campaign_id".to_string(), campaign.id.to_string()),
            ("recipient_id".to_string(), recipient.id.to_string()),
        ],
    }
}

pub(crate) fn build_step_message(
    step: &SequenceStep,
    enrollment_id: courier_common::EnrollmentId,
    recipient: &Recipient,
    address: &courier_common::EmailAddress,
    config: &EngineConfig,
) -> OutboundMessage {
    let link = unsubscribe_link(&config.unsubscribe_base_url, recipient.id);
    OutboundMessage {
        to: address.clone(),
        from: config.sequence_from.clone(),
        reply_to: config.sequence_reply_to.clone(),
        subject: step.subject.clone(),
        html: html_with_footer(&step.body, &link),
        text: text_with_footer(&step.body, &link),
        custom_args: vec![
            ("enrollment_id".to_string(), enrollment_id.to_string()),
            ("step_order".to_string(), step.order.to_string()),
            ("recipient_id".to_string(), recipient.id.to_string()),
        ],
    }
}
