use std::{collections::BTreeSet, fmt};

use evotree_program::{MutationCategory, Tokens};
use rand::Rng;

use crate::{
    evaluator::{Evaluator, EvaluatorParseError},
    optimizer::{Strategy, UpdateReport},
    record::Sample,
};

/// Routes each input to one member evaluator.
///
/// The member is picked by the value of input dimension `selector`, rounded and clamped to
/// the member range. Inputs without a finite selector value go to member 0.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamEvaluator {
    selector: usize,
    members: Vec<Evaluator>,
}

impl TeamEvaluator {
    /// # Panics
    ///
    /// Panics if `members` is empty.
    #[must_use]
    pub fn new(selector: usize, members: Vec<Evaluator>) -> Self {
        assert!(!members.is_empty(), "team without members");
        Self { selector, members }
    }

    #[must_use]
    pub fn selector(&self) -> usize {
        self.selector
    }

    #[must_use]
    pub fn members(&self) -> &[Evaluator] {
        &self.members
    }

    /// Index of the member responsible for `x`.
    #[must_use]
    pub fn route(&self, x: &[f64]) -> usize {
        let v = x.get(self.selector).map_or(f64::NAN, |v| v.round());
        if !v.is_finite() || v <= 0.0 {
            return 0;
        }
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let i = v as usize;
        i.min(self.members.len() - 1)
    }

    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        self.members[self.route(x)].evaluate(x)
    }

    fn partition<'a>(&self, samples: &[Sample<'a>]) -> Vec<Vec<Sample<'a>>> {
        let mut parts = vec![Vec::new(); self.members.len()];
        for sample in samples {
            parts[self.route(sample.input)].push(*sample);
        }
        parts
    }

    #[must_use]
    pub fn objective(&self, samples: &[Sample<'_>]) -> f64 {
        std::iter::zip(&self.members, self.partition(samples))
            .map(|(member, part)| member.objective(&part))
            .sum()
    }

    /// Updates every member on the samples routed to it.
    ///
    /// Members without samples are left unchanged. The update succeeds if any member's does.
    #[must_use]
    pub fn update(&self, samples: &[Sample<'_>], strategy: &Strategy) -> (Self, UpdateReport) {
        let mut members = Vec::with_capacity(self.members.len());
        let mut report = UpdateReport::rejected(0.0);
        for (member, part) in std::iter::zip(&self.members, self.partition(samples)) {
            if part.is_empty() {
                report.objective += member.objective(&part);
                members.push(member.clone());
                continue;
            }
            let (next, r) = member.update(&part, strategy);
            report.success |= r.success;
            report.objective += r.objective;
            report.improvement += r.improvement;
            report.rel_change = report.rel_change.max(r.rel_change);
            members.push(next);
        }
        let next = Self {
            selector: self.selector,
            members,
        };
        (next, report)
    }

    /// Mutates one random member.
    pub fn mutate<R>(&self, rng: &mut R, category: MutationCategory) -> Option<Self>
    where
        R: Rng + ?Sized,
    {
        let i = rng.random_range(0..self.members.len());
        let member = self.members[i].mutate(rng, category)?;
        Some(self.replace(i, member))
    }

    /// Mates one random member with its counterpart in `partner`.
    ///
    /// Returns `None` if the teams differ in selector or size.
    pub fn mate<R>(&self, rng: &mut R, partner: &TeamEvaluator) -> Option<Self>
    where
        R: Rng + ?Sized,
    {
        if self.selector != partner.selector || self.members.len() != partner.members.len() {
            return None;
        }
        let i = rng.random_range(0..self.members.len());
        let member = self.members[i].mate(rng, &partner.members[i])?;
        Some(self.replace(i, member))
    }

    fn replace(&self, i: usize, member: Evaluator) -> Self {
        let mut members = self.members.clone();
        members[i] = member;
        Self {
            selector: self.selector,
            members,
        }
    }

    /// Prunes every member with the same `threshold`.
    #[must_use]
    pub fn prune(&self, threshold: f64) -> Self {
        Self {
            selector: self.selector,
            members: self.members.iter().map(|m| m.prune(threshold)).collect(),
        }
    }

    /// Makes every tree member reference each index in `indices`.
    pub fn add_inputs<R>(&self, rng: &mut R, indices: &[usize]) -> Self
    where
        R: Rng + ?Sized,
    {
        Self {
            selector: self.selector,
            members: self
                .members
                .iter()
                .map(|m| m.add_inputs(rng, indices))
                .collect(),
        }
    }

    /// Widest input arity declared by a member, `None` if no member declares one.
    #[must_use]
    pub fn dim(&self) -> Option<usize> {
        self.members.iter().filter_map(Evaluator::dim).max()
    }

    /// Union of the members' inputs.
    #[must_use]
    pub fn list_inputs(&self) -> BTreeSet<usize> {
        self.members.iter().flat_map(Evaluator::list_inputs).collect()
    }

    /// Sum of the members' complexities.
    #[must_use]
    pub fn complexity(&self) -> usize {
        self.members.iter().map(Evaluator::complexity).sum()
    }

    #[must_use]
    pub fn is_stable(&self) -> bool {
        self.members.iter().all(Evaluator::is_stable)
    }

    pub(crate) fn parse_tokens(tokens: &mut Tokens<'_>) -> Result<Self, EvaluatorParseError> {
        let selector = tokens.parse("selector")?;
        let count: usize = tokens.parse("member count")?;
        if count == 0 {
            return Err(EvaluatorParseError::EmptyTeam);
        }
        let members = (0..count)
            .map(|_| Evaluator::parse_tokens(tokens))
            .collect::<Result<_, _>>()?;
        Ok(Self { selector, members })
    }
}

impl fmt::Display for TeamEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team {} {}", self.selector, self.members.len())?;
        for member in &self.members {
            write!(f, " {member}")?;
        }
        Ok(())
    }
}
