//! Attendance records and roster-based seeding.

use serde::{Deserialize, Serialize};

use crate::types::{AttendanceStatus, ParticipantId, Role, SessionId};

/// Who is currently assigned to a class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub teachers: Vec<ParticipantId>,
    pub students: Vec<ParticipantId>,
}

impl Roster {
    /// Every assigned participant once, teachers first.
    ///
    /// Someone listed as both teacher and student is seeded as a teacher.
    pub fn participants(&self) -> Vec<(&ParticipantId, Role)> {
        let mut seen: Vec<&ParticipantId> = Vec::new();
        let mut participants = Vec::new();
        let tagged = self
            .teachers
            .iter()
            .map(|id| (id, Role::Teacher))
            .chain(self.students.iter().map(|id| (id, Role::Student)));
        for (id, role) in tagged {
            if !seen.contains(&id) {
                seen.push(id);
                participants.push((id, role));
            }
        }
        participants
    }

    pub fn is_empty(&self) -> bool {
        self.teachers.is_empty() && self.students.is_empty()
    }
}

/// Attendance of one participant at one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
    pub role: Role,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    /// A freshly seeded record.
    pub const fn expected(
        session_id: SessionId,
        participant_id: ParticipantId,
        role: Role,
    ) -> Self {
        Self {
            session_id,
            participant_id,
            role,
            status: AttendanceStatus::Expected,
        }
    }
}

/// One `expected` record per (session, assigned participant).
pub fn seed_records(session_ids: &[SessionId], roster: &Roster) -> Vec<AttendanceRecord> {
    let participants = roster.participants();
    session_ids
        .iter()
        .flat_map(|session_id| {
            participants.iter().map(move |(participant_id, role)| {
                AttendanceRecord::expected(session_id.clone(), (*participant_id).clone(), *role)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    #[test]
    fn participants_are_unique_with_teachers_first() {
        let roster = Roster {
            teachers: vec![pid("t1")],
            students: vec![pid("s1"), pid("t1"), pid("s1")],
        };
        let participants: Vec<(String, Role)> = roster
            .participants()
            .into_iter()
            .map(|(id, role)| (id.to_string(), role))
            .collect();
        assert_eq!(
            participants,
            vec![
                ("t1".to_string(), Role::Teacher),
                ("s1".to_string(), Role::Student)
            ]
        );
    }

    #[test]
    fn seed_records_cover_every_session_and_participant() {
        let roster = Roster {
            teachers: vec![pid("t1")],
            students: vec![pid("s1"), pid("s2")],
        };
        let sessions = vec![SessionId::new("a").unwrap(), SessionId::new("b").unwrap()];
        let records = seed_records(&sessions, &roster);
        assert_eq!(records.len(), 6);
        assert!(records
            .iter()
            .all(|record| record.status == AttendanceStatus::Expected));
        assert_eq!(records[0].session_id.as_str(), "a");
        assert_eq!(records[0].role, Role::Teacher);
        assert_eq!(records[5].participant_id.as_str(), "s2");
    }

    #[test]
    fn empty_roster_seeds_nothing() {
        let sessions = vec![SessionId::new("a").unwrap()];
        assert!(seed_records(&sessions, &Roster::default()).is_empty());
    }
}
