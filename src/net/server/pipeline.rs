//! Filtering and rewriting of messages.
//!
//! A [`Pipeline`] decides what happens to a request that isn’t handled
//! otherwise. It consists of a sequence of [stages][Stage]. Each stage
//! may rewrite the message and checks whether it matches a condition. The
//! results of the conditions are combined from left to right via the
//! [`Combine`] of each stage. Depending on whether the combined result is
//! a match, the pipeline performs one of two [actions][Action].
//!
//! If the action is [`Action::Forward`], the rewritten request is sent
//! upstream via the resolver and the answer travels through the same
//! stages in the [`Direction::Outbound`] direction before it is returned
//! to the client.

use super::error_response;
use crate::base::iana::Rcode;
use crate::base::message::Message;
use crate::resolv::Resolver;
use std::boxed::Box;
use std::fmt;
use std::vec::Vec;
use tracing::{debug, trace, warn};

//------------ Direction -----------------------------------------------------

/// The direction a message travels through the pipeline.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    /// A request received from a client.
    Inbound,

    /// An answer received from upstream.
    Outbound,
}

//------------ Combine -------------------------------------------------------

/// How the result of a stage is combined with those of earlier stages.
///
/// The combination of the first stage is ignored.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Combine {
    #[default]
    And,
    Or,
}

//------------ Action --------------------------------------------------------

/// What to do with a request.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Send the request upstream and return the answer.
    Forward,

    /// Answer with REFUSED.
    Refuse,

    /// Don’t answer at all.
    Drop,
}

//------------ Stage ---------------------------------------------------------

type Predicate = Box<dyn Fn(&Message, Direction) -> bool + Send + Sync>;
type Transform = Box<dyn Fn(Message, Direction) -> Message + Send + Sync>;

/// A step of a pipeline.
///
/// The transform of the stage is applied first. The predicate then sees
/// the transformed message.
pub struct Stage {
    predicate: Predicate,
    transform: Option<Transform>,
    combine: Combine,
}

impl Stage {
    /// Creates a stage with a predicate that combines via AND.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Message, Direction) -> bool + Send + Sync + 'static,
    {
        Stage {
            predicate: Box::new(predicate),
            transform: None,
            combine: Combine::And,
        }
    }

    /// Sets the transform of the stage.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Message, Direction) -> Message + Send + Sync + 'static,
    {
        self.transform = Some(Box::new(transform));
        self
    }

    /// Sets how the stage’s result is combined with earlier ones.
    pub fn combine(mut self, combine: Combine) -> Self {
        self.combine = combine;
        self
    }

    fn apply(&self, message: Message, direction: Direction) -> (Message, bool) {
        let message = match self.transform.as_ref() {
            Some(transform) => transform(message, direction),
            None => message,
        };
        let matched = (self.predicate)(&message, direction);
        (message, matched)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stage")
            .field("transform", &self.transform.is_some())
            .field("combine", &self.combine)
            .finish()
    }
}

//------------ Pipeline ------------------------------------------------------

/// A sequence of stages and the actions to take.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    on_match: Action,
    otherwise: Action,
}

impl Pipeline {
    /// Creates a pipeline without stages that refuses everything.
    pub fn new() -> Self {
        Pipeline {
            stages: Vec::new(),
            on_match: Action::Forward,
            otherwise: Action::Refuse,
        }
    }

    /// Adds a stage at the end.
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Sets the action if the stages match.
    pub fn on_match(mut self, action: Action) -> Self {
        self.on_match = action;
        self
    }

    /// Sets the action if the stages don’t match.
    pub fn otherwise(mut self, action: Action) -> Self {
        self.otherwise = action;
        self
    }

    /// Passes a message through all stages.
    ///
    /// Returns the transformed message and whether the stages matched. A
    /// pipeline without stages never matches.
    pub fn evaluate(
        &self,
        message: Message,
        direction: Direction,
    ) -> (Message, bool) {
        let mut message = message;
        let mut res: Option<bool> = None;
        for stage in &self.stages {
            let (next, matched) = stage.apply(message, direction);
            message = next;
            res = Some(match (res, stage.combine) {
                (None, _) => matched,
                (Some(acc), Combine::And) => acc && matched,
                (Some(acc), Combine::Or) => acc || matched,
            });
        }
        (message, res.unwrap_or(false))
    }

    /// Returns the action for a request and the transformed request.
    pub fn decide(&self, request: Message) -> (Action, Message) {
        let (message, matched) = self.evaluate(request, Direction::Inbound);
        let action = if matched { self.on_match } else { self.otherwise };
        (action, message)
    }

    /// Processes a request.
    ///
    /// Returns the response to send back or `None` if the request should
    /// be dropped. If the request is to be forwarded but there is no
    /// resolver or forwarding fails, the response is SERVFAIL.
    pub async fn process(
        &self,
        request: &Message,
        resolver: Option<&Resolver>,
    ) -> Option<Message> {
        let (action, message) = self.decide(request.clone());
        trace!("pipeline action for {}: {:?}", request.header.id(), action);
        match action {
            Action::Drop => None,
            Action::Refuse => Some(error_response(request, Rcode::REFUSED)),
            Action::Forward => {
                let resolver = match resolver {
                    Some(resolver) => resolver,
                    None => {
                        debug!("cannot forward request: no resolver");
                        return Some(error_response(request, Rcode::SERVFAIL));
                    }
                };
                let mut message = message;
                message.header.set_random_id();
                match resolver.request(message).await {
                    Ok(answer) => {
                        let (mut answer, _) =
                            self.evaluate(answer, Direction::Outbound);
                        answer.header.set_id(request.header.id());
                        Some(answer)
                    }
                    Err(err) => {
                        warn!("forwarding request failed: {}", err);
                        Some(error_response(request, Rcode::SERVFAIL))
                    }
                }
            }
        }
    }
}

//--- Default

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::base::iana::Rtype;
    use crate::base::name::Name;
    use crate::base::question::Question;
    use crate::resolv::ResolvConf;
    use std::str::FromStr;
    use tokio::net::UdpSocket;

    fn query(qname: &str, qtype: Rtype) -> Message {
        Message::query(Question::new_in(Name::from_str(qname).unwrap(), qtype))
    }

    fn is_type(rtype: Rtype) -> Stage {
        Stage::new(move |msg: &Message, _| {
            msg.first_question().map(|q| q.qtype()) == Some(rtype)
        })
    }

    #[test]
    fn combine() {
        let and = Pipeline::new()
            .stage(is_type(Rtype::A))
            .stage(is_type(Rtype::AAAA));
        assert!(!and.evaluate(query("example.com", Rtype::A), Direction::Inbound).1);

        let or = Pipeline::new()
            .stage(is_type(Rtype::A))
            .stage(is_type(Rtype::AAAA).combine(Combine::Or));
        assert!(or.evaluate(query("example.com", Rtype::A), Direction::Inbound).1);
        assert!(or.evaluate(query("example.com", Rtype::AAAA), Direction::Inbound).1);
        assert!(!or.evaluate(query("example.com", Rtype::MX), Direction::Inbound).1);

        assert!(!Pipeline::new()
            .evaluate(query("example.com", Rtype::A), Direction::Inbound)
            .1);
    }

    #[test]
    fn transform_is_visible() {
        // The first stage turns every MX query into an A query, the second
        // one only matches A queries.
        let pipeline = Pipeline::new()
            .stage(Stage::new(|_, _| true).with_transform(|mut msg, dir| {
                if dir == Direction::Inbound {
                    if let Some(q) = msg.question.first_mut() {
                        *q = Question::new_in(q.qname().clone(), Rtype::A);
                    }
                }
                msg
            }))
            .stage(is_type(Rtype::A))
            .on_match(Action::Forward)
            .otherwise(Action::Drop);
        let (action, msg) = pipeline.decide(query("example.com", Rtype::MX));
        assert_eq!(action, Action::Forward);
        assert_eq!(msg.first_question().unwrap().qtype(), Rtype::A);

        let (_, matched) = pipeline
            .evaluate(query("example.com", Rtype::MX), Direction::Outbound);
        assert!(!matched);
    }

    #[tokio::test]
    async fn process() {
        let request = query("example.com", Rtype::A);

        let refuse = Pipeline::new();
        let response = refuse.process(&request, None).await.unwrap();
        assert_eq!(response.header.rcode(), Rcode::REFUSED);
        assert_eq!(response.header.id(), request.header.id());

        let drop = Pipeline::new().otherwise(Action::Drop);
        assert!(drop.process(&request, None).await.is_none());

        let forward = Pipeline::new().stage(Stage::new(|_, _| true));
        let response = forward.process(&request, None).await.unwrap();
        assert_eq!(response.header.rcode(), Rcode::SERVFAIL);
    }

    #[tokio::test]
    async fn forward() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut conf = ResolvConf::new();
        conf.servers.push(upstream.local_addr().unwrap());
        let resolver = Resolver::new(conf);
        let pipeline = Pipeline::new()
            .stage(Stage::new(|_, _| true).with_transform(|mut msg, dir| {
                if dir == Direction::Outbound {
                    msg.header.set_ra(true);
                }
                msg
            }));
        let request = query("example.com", Rtype::A);
        let upstream_side = async {
            let mut buf = vec![0u8; 512];
            let (len, peer) = upstream.recv_from(&mut buf).await.unwrap();
            let forwarded = Message::from_octets(&buf[..len]).unwrap();
            let mut answer = forwarded.make_response();
            answer.header.set_rcode(Rcode::NXDOMAIN);
            upstream.send_to(&answer.to_wire().unwrap(), peer).await.unwrap();
        };
        let (response, _) = tokio::join!(
            pipeline.process(&request, Some(&resolver)),
            upstream_side
        );
        let response = response.unwrap();
        assert_eq!(response.header.id(), request.header.id());
        assert_eq!(response.header.rcode(), Rcode::NXDOMAIN);
        assert!(response.header.ra());
    }
}
