//! Per-participant stream session

use crate::channel::ChannelHandle;

/// One participant's channel and the negotiation state seen so far
///
/// Owned by its [`Room`](crate::room::Room) and only touched under the room lock.
#[derive(Debug)]
pub struct StreamSession {
    id: String,
    operator: ChannelHandle,
    participant: ChannelHandle,
    offer: Option<String>,
    answer: Option<String>,
    operator_ice_candidates: Vec<String>,
    participant_ice_candidates: Vec<String>,
}

/// Copy of a session's negotiation state
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub id: String,
    pub offer: Option<String>,
    pub answer: Option<String>,
    pub operator_ice_candidates: Vec<String>,
    pub participant_ice_candidates: Vec<String>,
}

impl StreamSession {
    pub fn new(id: String, operator: ChannelHandle, participant: ChannelHandle) -> Self {
        Self {
            id,
            operator,
            participant,
            offer: None,
            answer: None,
            operator_ice_candidates: Vec::new(),
            participant_ice_candidates: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operator(&self) -> &ChannelHandle {
        &self.operator
    }

    pub fn participant(&self) -> &ChannelHandle {
        &self.participant
    }

    pub fn offer(&self) -> Option<&str> {
        self.offer.as_deref()
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn operator_ice_candidates(&self) -> &[String] {
        &self.operator_ice_candidates
    }

    pub fn participant_ice_candidates(&self) -> &[String] {
        &self.participant_ice_candidates
    }

    pub fn set_offer(&mut self, offer: String) {
        self.offer = Some(offer);
    }

    pub fn set_answer(&mut self, answer: String) {
        self.answer = Some(answer);
    }

    pub fn add_operator_ice_candidate(&mut self, candidate: String) {
        self.operator_ice_candidates.push(candidate);
    }

    pub fn add_participant_ice_candidate(&mut self, candidate: String) {
        self.participant_ice_candidates.push(candidate);
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            offer: self.offer.clone(),
            answer: self.answer.clone(),
            operator_ice_candidates: self.operator_ice_candidates.clone(),
            participant_ice_candidates: self.participant_ice_candidates.clone(),
        }
    }
}
