//! Cisco style codec feedback
//!
//! The codec streams XML feedback documents:
//!
//! ```xml
//! <XmlDoc resultId="">
//!   <Status>
//!     <Call item="3" maxOccurrence="n">
//!       <Status>Connected</Status>
//!       <Direction>Incoming</Direction>
//!       <CallbackNumber>sip:alice@example.com</CallbackNumber>
//!     </Call>
//!   </Status>
//! </XmlDoc>
//! ```
//!
//! Each document is parsed into a [`StatusNode`] tree and every element is
//! dispatched under its path below the `Status`, `Configuration` or `Event`
//! section. [`CiscoCodec`] registers the parsers that feed a
//! [`CallAggregator`].

use std::str::FromStr;
use std::sync::{Arc, Weak};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, warn};

use super::parse_toggle;
use crate::aggregator::CallAggregator;
use crate::dispatch::{StatusCallback, StatusCategory, StatusDispatchRegistry, StatusKey};
use crate::errors::{ConferenceError, Result};
use crate::participant::ParticipantUpdate;
use crate::types::{CallId, ParticipantStatus};

/// One element of a feedback document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusNode {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<StatusNode>,
}

impl StatusNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Parse a complete document and return its root element
    pub fn parse_xml(xml: &str) -> Result<StatusNode> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut stack: Vec<StatusNode> = Vec::new();
        let mut root: Option<StatusNode> = None;

        loop {
            match reader.read_event_into(&mut buf)? {
                Event::Start(ref e) => stack.push(Self::from_start(e)?),
                Event::Empty(ref e) => {
                    let node = Self::from_start(e)?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Text(ref e) => {
                    let text = e
                        .unescape()
                        .map_err(|err| ConferenceError::malformed(err.to_string()))?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Event::CData(ref e) => {
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&String::from_utf8_lossy(e));
                    }
                }
                Event::End(_) => {
                    let node = stack
                        .pop()
                        .ok_or_else(|| ConferenceError::malformed("unexpected closing tag"))?;
                    Self::attach(&mut stack, &mut root, node)?;
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if !stack.is_empty() {
            return Err(ConferenceError::malformed("unclosed element in feedback document"));
        }
        root.ok_or_else(|| ConferenceError::malformed("empty feedback document"))
    }

    fn from_start(start: &BytesStart) -> Result<StatusNode> {
        let mut node = StatusNode::new(String::from_utf8_lossy(start.local_name().as_ref()));
        for attr in start.attributes() {
            let attr = attr.map_err(|e| ConferenceError::malformed(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| ConferenceError::malformed(e.to_string()))?;
            node.attributes.push((
                String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                value.into_owned(),
            ));
        }
        Ok(node)
    }

    fn attach(stack: &mut [StatusNode], root: &mut Option<StatusNode>, node: StatusNode) -> Result<()> {
        match stack.last_mut() {
            Some(parent) => parent.children.push(node),
            None if root.is_some() => {
                return Err(ConferenceError::malformed("multiple root elements"));
            }
            None => *root = Some(node),
        }
        Ok(())
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&StatusNode> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a StatusNode> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Trimmed text of this element, `None` when empty
    pub fn value(&self) -> Option<&str> {
        let text = self.text.trim();
        (!text.is_empty()).then_some(text)
    }

    /// Trimmed text of the first child with this name
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).and_then(StatusNode::value)
    }
}

/// Result of parsing one `Call` element.
///
/// Fields that failed to parse are left unset in `update` and reported in
/// `errors`; the rest of the fragment is still usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFragment {
    pub call_id: CallId,
    pub update: ParticipantUpdate,
    pub errors: Vec<ConferenceError>,
}

fn parse_field<T>(slot: &mut Option<T>, token: Option<&str>, errors: &mut Vec<ConferenceError>)
where
    T: FromStr<Err = ConferenceError>,
{
    if let Some(token) = token {
        match token.parse() {
            Ok(value) => *slot = Some(value),
            Err(e) => errors.push(e),
        }
    }
}

/// Parse a `Call` element. Only a missing or invalid `item` id fails the
/// whole fragment.
pub fn parse_call_fragment(node: &StatusNode) -> Result<CallFragment> {
    let item = node
        .attribute("item")
        .ok_or_else(|| ConferenceError::malformed("Call element without item attribute"))?;
    let call_id = item
        .trim()
        .parse::<u64>()
        .map(CallId)
        .map_err(|_| ConferenceError::malformed(format!("invalid call id '{}'", item)))?;

    let mut update = ParticipantUpdate::new();
    let mut errors = Vec::new();

    let ghost = node
        .attribute("ghost")
        .is_some_and(|ghost| ghost.trim().eq_ignore_ascii_case("true"));
    if ghost {
        update.status = Some(ParticipantStatus::Disconnected);
    } else {
        parse_field(&mut update.status, node.child_text("Status"), &mut errors);
    }

    parse_field(&mut update.direction, node.child_text("Direction"), &mut errors);
    parse_field(&mut update.answer_state, node.child_text("AnswerState"), &mut errors);
    parse_field(&mut update.call_type, node.child_text("CallType"), &mut errors);
    update.name = node.child_text("DisplayName").map(str::to_string);
    update.number = node.child_text("CallbackNumber").map(str::to_string);
    update.remote_number = node.child_text("RemoteNumber").map(str::to_string);

    Ok(CallFragment {
        call_id,
        update,
        errors,
    })
}

fn section_category(name: &str) -> Option<StatusCategory> {
    match name {
        "Status" => Some(StatusCategory::Status),
        "Configuration" => Some(StatusCategory::Configuration),
        "Event" => Some(StatusCategory::Event),
        _ => None,
    }
}

/// Binds a Cisco style codec's feedback to a call aggregator
pub struct CiscoCodec {
    aggregator: Arc<CallAggregator>,
    registry: Arc<StatusDispatchRegistry<StatusNode>>,
    registrations: Vec<(StatusKey, StatusCallback<StatusNode>)>,
}

impl CiscoCodec {
    pub fn new(aggregator: Arc<CallAggregator>, registry: Arc<StatusDispatchRegistry<StatusNode>>) -> Self {
        let weak = Arc::downgrade(&aggregator);
        let registrations = vec![
            (StatusKey::new(StatusCategory::Status, ["Call"]), call_parser(weak.clone())),
            (
                StatusKey::new(StatusCategory::Status, ["Conference", "DoNotDisturb"]),
                toggle_parser(weak.clone(), "do not disturb", CallAggregator::on_do_not_disturb_status),
            ),
            (
                StatusKey::new(StatusCategory::Status, ["Audio", "Microphones", "Mute"]),
                toggle_parser(weak.clone(), "microphone mute", CallAggregator::on_privacy_mute_status),
            ),
            (
                StatusKey::new(StatusCategory::Configuration, ["Conference", "AutoAnswer", "Mode"]),
                toggle_parser(weak, "auto answer", CallAggregator::on_auto_answer_status),
            ),
        ];
        for (key, callback) in &registrations {
            registry.register(key.clone(), callback.clone());
        }

        Self {
            aggregator,
            registry,
            registrations,
        }
    }

    pub fn aggregator(&self) -> &Arc<CallAggregator> {
        &self.aggregator
    }

    pub fn registry(&self) -> &Arc<StatusDispatchRegistry<StatusNode>> {
        &self.registry
    }

    /// Handle one feedback document.
    ///
    /// Only a document that is not well formed is an error; field level
    /// problems are logged by the parsers.
    pub fn handle_feedback(&self, xml: &str) -> Result<()> {
        let root = StatusNode::parse_xml(xml)?;
        self.dispatch_document(&root);
        Ok(())
    }

    /// Handle a full call status response. Calls the aggregator knows that
    /// are missing from it are orphaned.
    pub fn handle_call_snapshot(&self, xml: &str) -> Result<()> {
        let root = StatusNode::parse_xml(xml)?;
        self.dispatch_document(&root);

        let reported: Vec<CallId> = sections(&root)
            .filter(|section| section.name == "Status")
            .flat_map(|section| section.children_named("Call"))
            .filter(|call| !call.attribute("ghost").is_some_and(|g| g.eq_ignore_ascii_case("true")))
            .filter_map(|call| parse_call_fragment(call).ok())
            .map(|fragment| fragment.call_id)
            .collect();
        self.aggregator.on_call_snapshot(&reported);
        Ok(())
    }

    fn dispatch_document(&self, root: &StatusNode) {
        for section in sections(root) {
            let Some(category) = section_category(&section.name) else {
                debug!("[{}] Ignoring feedback section {}", self.aggregator.name(), section.name);
                continue;
            };
            let mut path = Vec::new();
            for child in &section.children {
                self.dispatch_node(category, &mut path, child);
            }
        }
    }

    fn dispatch_node(&self, category: StatusCategory, path: &mut Vec<String>, node: &StatusNode) {
        path.push(node.name.clone());
        self.registry.dispatch(&StatusKey::new(category, path.iter().cloned()), node);
        for child in &node.children {
            self.dispatch_node(category, path, child);
        }
        path.pop();
    }
}

impl Drop for CiscoCodec {
    fn drop(&mut self) {
        for (key, callback) in &self.registrations {
            self.registry.unregister(key, callback);
        }
    }
}

/// The sections of a document: the children of `XmlDoc`, or the root itself
fn sections(root: &StatusNode) -> Box<dyn Iterator<Item = &StatusNode> + '_> {
    if root.name == "XmlDoc" {
        Box::new(root.children.iter())
    } else {
        Box::new(std::iter::once(root))
    }
}

fn call_parser(aggregator: Weak<CallAggregator>) -> StatusCallback<StatusNode> {
    Arc::new(move |node: &StatusNode| {
        let Some(aggregator) = aggregator.upgrade() else {
            return;
        };
        match parse_call_fragment(node) {
            Ok(fragment) => {
                for error in &fragment.errors {
                    warn!("[{}] Call {}: {}", aggregator.name(), fragment.call_id, error);
                }
                aggregator.on_status_fragment(fragment.call_id, &fragment.update);
            }
            Err(e) => warn!("[{}] Dropping call fragment: {}", aggregator.name(), e),
        }
    })
}

fn toggle_parser(
    aggregator: Weak<CallAggregator>,
    what: &'static str,
    apply: fn(&CallAggregator, bool),
) -> StatusCallback<StatusNode> {
    Arc::new(move |node: &StatusNode| {
        let Some(aggregator) = aggregator.upgrade() else {
            return;
        };
        let Some(token) = node.value() else {
            return;
        };
        match parse_toggle(token) {
            Ok(enabled) => apply(&aggregator, enabled),
            Err(e) => warn!("[{}] Bad {} value: {}", aggregator.name(), what, e),
        }
    })
}
