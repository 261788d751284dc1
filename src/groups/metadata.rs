//! Group metadata model.

use serde::{Deserialize, Serialize};

/// A group member as seen by the metadata cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_owner: bool,
}

impl Participant {
    pub fn member(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
            is_owner: false,
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            is_admin: true,
            ..Self::member(id)
        }
    }
}

/// Metadata of one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    pub subject: Option<String>,
    pub owner: Option<String>,
    pub description: Option<String>,
    /// Member count.
    pub size: Option<u32>,
    /// Administrators and the owner. Regular members only show up in `size`.
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl GroupMetadata {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Overwrite every field that is set in `patch`.
    pub fn apply(&mut self, patch: MetadataPatch) {
        if let Some(subject) = patch.subject {
            self.subject = Some(subject);
        }
        if let Some(owner) = patch.owner {
            self.owner = Some(owner);
        }
        if let Some(description) = patch.description {
            self.description = Some(description);
        }
        if let Some(size) = patch.size {
            self.size = Some(size);
        }
        if let Some(participants) = patch.participants {
            self.participants = participants;
        }
    }

    /// Apply a roster change reported by a membership event.
    pub fn apply_participants(&mut self, update: &ParticipantUpdate) {
        let listed = |id: &str| update.participants.iter().any(|p| p == id);

        match update.action {
            ParticipantAction::Add => {
                let joined = update
                    .participants
                    .iter()
                    .filter(|id| self.participants.iter().all(|p| &p.id != *id))
                    .count() as u32;
                self.size = self.size.map(|n| n.saturating_add(joined));
            }
            ParticipantAction::Remove => {
                self.participants.retain(|p| !listed(&p.id));
                let left = update.participants.len() as u32;
                self.size = self.size.map(|n| n.saturating_sub(left));
            }
            ParticipantAction::Promote => {
                for id in &update.participants {
                    match self.participants.iter_mut().find(|p| &p.id == id) {
                        Some(participant) => participant.is_admin = true,
                        None => self.participants.push(Participant::admin(id.clone())),
                    }
                }
            }
            // The owner cannot be demoted.
            ParticipantAction::Demote => {
                self.participants.retain(|p| p.is_owner || !listed(&p.id));
            }
        }
    }

    pub fn admins(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_admin || p.is_owner)
    }
}

/// Partial metadata update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub subject: Option<String>,
    pub owner: Option<String>,
    pub description: Option<String>,
    pub size: Option<u32>,
    pub participants: Option<Vec<Participant>>,
}

impl MetadataPatch {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Membership event for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantUpdate {
    pub action: ParticipantAction,
    pub participants: Vec<String>,
}

impl ParticipantUpdate {
    pub fn new(action: ParticipantAction, participants: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            action,
            participants: participants.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group() -> GroupMetadata {
        GroupMetadata {
            id: "-100123".into(),
            subject: Some("Rustaceans".into()),
            owner: Some("1".into()),
            size: Some(5),
            participants: vec![
                Participant {
                    is_owner: true,
                    ..Participant::member("1")
                },
                Participant::admin("2"),
            ],
            ..Default::default()
        }
    }

    fn admin_ids(metadata: &GroupMetadata) -> Vec<&str> {
        metadata.admins().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn test_patch_keeps_unset_fields() {
        let mut metadata = group();
        metadata.apply(MetadataPatch {
            description: Some("weekly meetups".into()),
            ..Default::default()
        });
        assert_eq!(metadata.subject.as_deref(), Some("Rustaceans"));
        assert_eq!(metadata.description.as_deref(), Some("weekly meetups"));
        assert_eq!(metadata.participants.len(), 2);
    }

    #[test]
    fn test_members_joining_only_change_size() {
        let mut metadata = group();
        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Add, ["3", "4"]));
        assert_eq!(admin_ids(&metadata), vec!["1", "2"]);
        assert_eq!(metadata.size, Some(7));

        // Already counted.
        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Add, ["2"]));
        assert_eq!(metadata.size, Some(7));

        let mut unsized_group = GroupMetadata::new("-1");
        unsized_group.apply_participants(&ParticipantUpdate::new(ParticipantAction::Add, ["3"]));
        assert!(unsized_group.participants.is_empty());
        assert_eq!(unsized_group.size, None);
    }

    #[test]
    fn test_leaving_drops_admins_and_counts_members() {
        let mut metadata = group();
        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Remove, ["3"]));
        assert_eq!(admin_ids(&metadata), vec!["1", "2"]);
        assert_eq!(metadata.size, Some(4));

        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Remove, ["2"]));
        assert_eq!(admin_ids(&metadata), vec!["1"]);
        assert_eq!(metadata.size, Some(3));
    }

    #[test]
    fn test_promote_adds_unlisted_member() {
        let mut metadata = group();
        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Promote, ["3"]));
        assert_eq!(admin_ids(&metadata), vec!["1", "2", "3"]);
        assert_eq!(metadata.size, Some(5));

        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Promote, ["3"]));
        assert_eq!(metadata.participants.len(), 3);
    }

    #[test]
    fn test_demote_drops_admin_but_keeps_owner() {
        let mut metadata = group();
        metadata.apply_participants(&ParticipantUpdate::new(ParticipantAction::Demote, ["1", "2", "9"]));
        assert_eq!(admin_ids(&metadata), vec!["1"]);
        assert_eq!(metadata.size, Some(5));
    }
}
