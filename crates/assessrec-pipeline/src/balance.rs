use assessrec_core::types::CandidateMatch;

/// Share of the final list reserved for technical (K/P) assessments.
pub const TECHNICAL_SHARE: f64 = 0.7;

/// Reorders a final candidate list toward a 70/30 technical/behavioral mix.
///
/// Items are only moved, never dropped or duplicated. Within each group the
/// incoming (relevance) order is kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct CategoryBalancer;

enum Group {
    Technical,
    Behavioral,
    Other,
}

fn group_of(c: &CandidateMatch) -> Group {
    if c.record.has_technical() {
        Group::Technical
    } else if c.record.has_behavioral() {
        Group::Behavioral
    } else {
        Group::Other
    }
}

impl CategoryBalancer {
    pub fn targets(n: usize) -> (usize, usize) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let technical = (n as f64 * TECHNICAL_SHARE).floor() as usize;
        (technical, n - technical)
    }

    pub fn balance(&self, candidates: Vec<CandidateMatch>) -> Vec<CandidateMatch> {
        let n = candidates.len();
        let (target_technical, target_behavioral) = Self::targets(n);
        let mut technical = Vec::new();
        let mut behavioral = Vec::new();
        let mut other = Vec::new();
        for c in candidates {
            match group_of(&c) {
                Group::Technical => technical.push(c),
                Group::Behavioral => behavioral.push(c),
                Group::Other => other.push(c),
            }
        }

        let extra_technical = technical.split_off(target_technical.min(technical.len()));
        let extra_behavioral = behavioral.split_off(target_behavioral.min(behavioral.len()));
        let mut out = Vec::with_capacity(n);
        out.extend(technical);
        out.extend(behavioral);
        // Quota leftovers always leave room for every "other" item.
        out.extend(other);
        if out.len() < n {
            out.extend(extra_technical);
            out.extend(extra_behavioral);
        }
        out.truncate(n);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assessrec_core::types::{AssessmentRecord, CategoryCode};

    fn c(id: &str, codes: &[CategoryCode]) -> CandidateMatch {
        let mut rec = AssessmentRecord::new(id, id, "");
        rec.category_codes = codes.to_vec();
        CandidateMatch::new(rec, 0.0)
    }

    fn ids(v: &[CandidateMatch]) -> Vec<&str> { v.iter().map(|c| c.record.id.as_str()).collect() }

    use CategoryCode::{Behavioral as B, Knowledge as K, Performance as P, Situational as S};

    #[test]
    fn targets_use_floor() {
        assert_eq!(CategoryBalancer::targets(10), (7, 3));
        assert_eq!(CategoryBalancer::targets(5), (3, 2));
        assert_eq!(CategoryBalancer::targets(1), (0, 1));
        assert_eq!(CategoryBalancer::targets(0), (0, 0));
    }

    #[test]
    fn interleaved_input_becomes_technical_first() {
        let input = vec![c("b1", &[B]), c("p1", &[P]), c("b2", &[S]), c("p2", &[P]), c("p3", &[K])];
        assert_eq!(ids(&CategoryBalancer.balance(input)), ["p1", "p2", "p3", "b1", "b2"]);
    }

    #[test]
    fn technical_wins_for_mixed_codes() {
        let input = vec![c("mix", &[B, K]), c("b", &[B])];
        // n=2: one technical slot, one behavioral slot.
        assert_eq!(ids(&CategoryBalancer.balance(input)), ["mix", "b"]);
    }

    #[test]
    fn all_technical_keeps_everything_in_order() {
        let input: Vec<_> = (0..6).map(|i| c(&format!("t{i}"), &[K])).collect();
        assert_eq!(ids(&CategoryBalancer.balance(input)), ["t0", "t1", "t2", "t3", "t4", "t5"]);
    }

    #[test]
    fn all_behavioral_keeps_everything_in_order() {
        let input: Vec<_> = (0..4).map(|i| c(&format!("b{i}"), &[B])).collect();
        assert_eq!(ids(&CategoryBalancer.balance(input)), ["b0", "b1", "b2", "b3"]);
    }

    #[test]
    fn other_fills_gaps_before_overflow() {
        let input = vec![c("t1", &[K]), c("t2", &[K]), c("t3", &[K]), c("t4", &[K]), c("o1", &[])];
        // n=5: 3 technical, 0 behavioral available, then other, then overflow technical.
        assert_eq!(ids(&CategoryBalancer.balance(input)), ["t1", "t2", "t3", "o1", "t4"]);
    }

    #[test]
    fn length_is_preserved_for_any_mixture() {
        let codes: [&[CategoryCode]; 5] = [&[K], &[B], &[], &[P, S], &[S]];
        for n in 0..20 {
            let input: Vec<_> = (0..n).map(|i| c(&format!("x{i}"), codes[(i * 7 + n) % codes.len()])).collect();
            let mut before = ids(&input).iter().map(|s| s.to_string()).collect::<Vec<_>>();
            let out = CategoryBalancer.balance(input);
            let mut after = ids(&out).iter().map(|s| s.to_string()).collect::<Vec<_>>();
            assert_eq!(out.len(), n);
            before.sort();
            after.sort();
            assert_eq!(before, after);
        }
    }
}
