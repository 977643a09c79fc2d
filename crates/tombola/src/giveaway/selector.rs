// Tombola
// Copyright (C) 2025 Throneless Tech

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use rand::{Rng, seq::SliceRandom};
use std::collections::BTreeSet;
use tombola_common::error::{Result, TombolaErrorKind};

/// Draws `count` distinct winners uniformly at random without replacement.
///
/// A draw that cannot fill every slot is an error, never a partial list.
pub fn select(participants: &BTreeSet<String>, count: usize) -> Result<Vec<String>> {
    select_with(participants, count, &mut rand::thread_rng())
}

pub fn select_with<R>(participants: &BTreeSet<String>, count: usize, rng: &mut R) -> Result<Vec<String>>
where
    R: Rng + ?Sized,
{
    if count == 0 {
        return Err(
            TombolaErrorKind::Validation("winner count must be at least 1".to_owned()).into(),
        );
    }
    if participants.len() < count {
        return Err(TombolaErrorKind::InsufficientParticipants {
            needed: count,
            available: participants.len(),
        }
        .into());
    }

    let pool: Vec<&String> = participants.iter().collect();
    Ok(pool
        .choose_multiple(rng, count)
        .map(|winner| (*winner).clone())
        .collect())
}

/// Renders winners as platform mentions joined with a fixed separator.
pub fn mentions(winners: &[String]) -> String {
    winners
        .iter()
        .map(|id| format!("<@{id}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::TestResult;
    use quickcheck_macros::quickcheck;
    use rand::{SeedableRng, rngs::StdRng};

    fn ids(raw: &BTreeSet<u16>) -> BTreeSet<String> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[quickcheck]
    fn selects_distinct_members(raw: BTreeSet<u16>, count: u8) -> TestResult {
        let participants = ids(&raw);
        let count = count as usize;
        if count == 0 || count > participants.len() {
            return TestResult::discard();
        }
        let winners = select(&participants, count).unwrap();
        let unique: BTreeSet<&String> = winners.iter().collect();
        TestResult::from_bool(
            winners.len() == count
                && unique.len() == count
                && winners.iter().all(|w| participants.contains(w)),
        )
    }

    #[quickcheck]
    fn never_returns_a_partial_draw(raw: BTreeSet<u16>, extra: u8) -> bool {
        let participants = ids(&raw);
        let count = participants.len() + extra as usize + 1;
        select(&participants, count)
            .map_err(|err| err.is_insufficient_participants())
            .unwrap_err()
    }

    #[test]
    fn it_should_reject_a_zero_count() {
        let participants = ids(&[1, 2].into_iter().collect());
        let err = select(&participants, 0).unwrap_err();
        assert!(!err.is_insufficient_participants());
    }

    #[test]
    fn it_should_be_deterministic_for_a_seeded_rng() {
        let participants = ids(&(0..50).collect());
        let a = select_with(&participants, 5, &mut StdRng::seed_from_u64(7)).unwrap();
        let b = select_with(&participants, 5, &mut StdRng::seed_from_u64(7)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn it_should_take_everyone_when_count_matches() {
        let participants = ids(&[3, 1, 2].into_iter().collect());
        let mut winners = select(&participants, 3).unwrap();
        winners.sort();
        assert_eq!(winners, vec!["1", "2", "3"]);
    }

    #[test]
    fn it_should_format_mentions() {
        assert_eq!(mentions(&["1".into(), "2".into()]), "<@1>, <@2>");
        assert_eq!(mentions(&[]), "");
    }
}
