use std::{collections::BTreeSet, fmt, str::FromStr};

use evotree_program::{MutationCategory, ParseError, Tokens};
use rand::Rng;

use crate::{
    baseline::BaselineEvaluator,
    optimizer::{Strategy, UpdateReport},
    record::Sample,
    team::TeamEvaluator,
    tree::{MutationTag, TreeEvaluator},
};

/// Malformed serialized evaluator.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum EvaluatorParseError {
    #[display("unknown evaluator variant '{tag}'")]
    #[from(ignore)]
    UnknownVariant { tag: String },
    #[display("team without members")]
    #[from(ignore)]
    EmptyTeam,
    #[display("{_0}")]
    Syntax(ParseError),
}

/// A scoring function that can be trained, evolved and serialized.
///
/// All operations leave `self` untouched and return new evaluators.
#[derive(Debug, Clone, PartialEq, derive_more::From, derive_more::IsVariant)]
pub enum Evaluator {
    Tree(TreeEvaluator),
    Team(TeamEvaluator),
    Baseline(BaselineEvaluator),
}

impl Evaluator {
    #[must_use]
    pub fn evaluate(&self, x: &[f64]) -> f64 {
        match self {
            Self::Tree(tree) => tree.evaluate(x),
            Self::Team(team) => team.evaluate(x),
            Self::Baseline(baseline) => baseline.evaluate(x),
        }
    }

    /// Regularized squared error on `samples`.
    #[must_use]
    pub fn objective(&self, samples: &[Sample<'_>]) -> f64 {
        match self {
            Self::Tree(tree) => tree.objective(samples),
            Self::Team(team) => team.objective(samples),
            Self::Baseline(baseline) => baseline.objective(samples),
        }
    }

    /// Fits the evaluator to `samples`.
    ///
    /// Baselines are refit in closed form and ignore `strategy`.
    #[must_use]
    pub fn update(&self, samples: &[Sample<'_>], strategy: &Strategy) -> (Self, UpdateReport) {
        match self {
            Self::Tree(tree) => {
                let (next, report) = tree.update(samples, strategy);
                (next.into(), report)
            }
            Self::Team(team) => {
                let (next, report) = team.update(samples, strategy);
                (next.into(), report)
            }
            Self::Baseline(baseline) => {
                let (next, report) = baseline.update(samples);
                (next.into(), report)
            }
        }
    }

    /// Returns `None` when no mutation within the complexity bound was found.
    pub fn mutate<R>(&self, rng: &mut R, category: MutationCategory) -> Option<Self>
    where
        R: Rng + ?Sized,
    {
        match self {
            Self::Tree(tree) => tree.mutate(rng, category).map(Self::from),
            Self::Team(team) => team.mutate(rng, category).map(Self::from),
            Self::Baseline(baseline) => Some(baseline.mutate(rng, category).into()),
        }
    }

    /// Returns `None` for incompatible partners (different variant or shape) and when no
    /// child within the complexity bound was found.
    pub fn mate<R>(&self, rng: &mut R, partner: &Evaluator) -> Option<Self>
    where
        R: Rng + ?Sized,
    {
        match (self, partner) {
            (Self::Tree(a), Self::Tree(b)) => a.mate(rng, b).map(Self::from),
            (Self::Team(a), Self::Team(b)) => a.mate(rng, b).map(Self::from),
            (Self::Baseline(a), Self::Baseline(b)) => Some(a.mate(b).into()),
            _ => None,
        }
    }

    #[must_use]
    pub fn prune(&self, threshold: f64) -> Self {
        match self {
            Self::Tree(tree) => tree.prune(threshold).into(),
            Self::Team(team) => team.prune(threshold).into(),
            Self::Baseline(_) => self.clone(),
        }
    }

    /// Makes every tree reference each index in `indices`. Baselines are unchanged.
    pub fn add_inputs<R>(&self, rng: &mut R, indices: &[usize]) -> Self
    where
        R: Rng + ?Sized,
    {
        match self {
            Self::Tree(tree) => tree.add_inputs(rng, indices).into(),
            Self::Team(team) => team.add_inputs(rng, indices).into(),
            Self::Baseline(_) => self.clone(),
        }
    }

    #[must_use]
    pub fn list_inputs(&self) -> BTreeSet<usize> {
        match self {
            Self::Tree(tree) => tree.list_inputs(),
            Self::Team(team) => team.list_inputs(),
            Self::Baseline(_) => BTreeSet::new(),
        }
    }

    /// Input arity the evaluator was built for; inputs must be at least this long.
    ///
    /// Baselines read no input and return `None`.
    #[must_use]
    pub fn dim(&self) -> Option<usize> {
        match self {
            Self::Tree(tree) => Some(tree.program().dim()),
            Self::Team(team) => team.dim(),
            Self::Baseline(_) => None,
        }
    }

    /// Node count; a baseline counts as one node.
    #[must_use]
    pub fn complexity(&self) -> usize {
        match self {
            Self::Tree(tree) => tree.complexity(),
            Self::Team(team) => team.complexity(),
            Self::Baseline(_) => 1,
        }
    }

    #[must_use]
    pub fn is_stable(&self) -> bool {
        match self {
            Self::Tree(tree) => tree.is_stable(),
            Self::Team(team) => team.is_stable(),
            Self::Baseline(baseline) => baseline.is_stable(),
        }
    }

    /// Lineage label of a tree evaluator.
    #[must_use]
    pub fn mutation_tag(&self) -> Option<MutationTag> {
        match self {
            Self::Tree(tree) => Some(tree.tag()),
            Self::Team(_) | Self::Baseline(_) => None,
        }
    }

    /// Reads one tagged evaluator from `tokens`.
    pub fn parse_tokens(tokens: &mut Tokens<'_>) -> Result<Self, EvaluatorParseError> {
        let evaluator: Self = match tokens.next_token("evaluator variant")? {
            "tree" => TreeEvaluator::parse_tokens(tokens)?.into(),
            "team" => TeamEvaluator::parse_tokens(tokens)?.into(),
            "baseline" => BaselineEvaluator::parse_tokens(tokens)?.into(),
            tag => {
                return Err(EvaluatorParseError::UnknownVariant {
                    tag: tag.to_owned(),
                });
            }
        };
        Ok(evaluator)
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree(tree) => write!(f, "{tree}"),
            Self::Team(team) => write!(f, "{team}"),
            Self::Baseline(baseline) => write!(f, "{baseline}"),
        }
    }
}

impl FromStr for Evaluator {
    type Err = EvaluatorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = Tokens::new(s);
        let evaluator = Self::parse_tokens(&mut tokens)?;
        tokens.finish()?;
        Ok(evaluator)
    }
}

#[cfg(test)]
mod tests {
    use evotree_program::{Node, Program};
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;
    use crate::tree::TreeHyperparams;

    fn mixed_team(rng: &mut Pcg64Mcg) -> Evaluator {
        let params = TreeHyperparams {
            learning_rate: 0.25,
            w_reg: 0.0,
            ..TreeHyperparams::default()
        };
        TeamEvaluator::new(
            2,
            vec![
                TreeEvaluator::random(rng, 3, &[0, 1], 3, params).into(),
                BaselineEvaluator::new(-0.125, 0.5).into(),
                TreeEvaluator::random(rng, 3, &[1], 2, params).into(),
            ],
        )
        .into()
    }

    #[test]
    fn test_tree_text_format() {
        let root = Node::weighted_sum(1.0, vec![Node::input(2.0, 0), Node::constant(1.0, 3.0)]);
        let tree = TreeEvaluator::new(Program::new(root, 2).unwrap(), TreeHyperparams::default());
        assert_eq!(
            Evaluator::from(tree).to_string(),
            "tree 0.1 1000 0.001 true random 200 2 { 1 sum 2 { 2 input 0 } { 1 const 3 } }"
        );
    }

    #[test]
    fn test_roundtrip_nested_team() {
        let mut rng = Pcg64Mcg::seed_from_u64(60);
        for _ in 0..20 {
            let mut evaluator = mixed_team(&mut rng);
            if let Some(mutated) = evaluator.mutate(&mut rng, MutationCategory::Large) {
                evaluator = mutated;
            }
            let inner = TeamEvaluator::new(0, vec![evaluator.clone(), evaluator]);
            let evaluator = Evaluator::from(inner);
            let parsed: Evaluator = evaluator.to_string().parse().unwrap();
            assert_eq!(parsed, evaluator);
            assert_eq!(parsed.to_string(), evaluator.to_string());
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            "forest 1".parse::<Evaluator>(),
            Err(EvaluatorParseError::UnknownVariant { .. })
        ));
        assert_eq!(
            "team 0 0".parse::<Evaluator>(),
            Err(EvaluatorParseError::EmptyTeam)
        );
        assert!(matches!(
            "baseline 1 0.5 extra".parse::<Evaluator>(),
            Err(EvaluatorParseError::Syntax(ParseError::UnexpectedToken { .. }))
        ));
        assert!(matches!(
            "tree 0.1 1000 0.001 maybe random 200 1 { 1 input 0 }".parse::<Evaluator>(),
            Err(EvaluatorParseError::Syntax(ParseError::InvalidValue {
                what: "stability flag",
                ..
            }))
        ));
    }

    #[test]
    fn test_team_selector_beyond_input_routes_to_first_member() {
        let team: Evaluator = "team 5 1 baseline 0 0".parse().unwrap();
        assert_eq!(team.evaluate(&[1.0]), 0.0);
        assert_eq!(team.dim(), None);
        let team: Evaluator = "team 5 2 baseline 1 0 baseline 2 0".parse().unwrap();
        assert_eq!(team.evaluate(&[3.0]), 1.0);
    }

    #[test]
    fn test_dim() {
        let mut rng = Pcg64Mcg::seed_from_u64(63);
        let params = TreeHyperparams::default();
        let tree = TreeEvaluator::random(&mut rng, 4, &[0], 2, params);
        assert_eq!(Evaluator::from(tree).dim(), Some(4));
        assert_eq!(mixed_team(&mut rng).dim(), Some(3));
        assert_eq!(Evaluator::from(BaselineEvaluator::new(1.0, 0.1)).dim(), None);
    }

    #[test]
    fn test_mate_variant_mismatch() {
        let mut rng = Pcg64Mcg::seed_from_u64(61);
        let team = mixed_team(&mut rng);
        let baseline = Evaluator::from(BaselineEvaluator::new(1.0, 0.1));
        assert!(team.mate(&mut rng, &baseline).is_none());
        assert!(baseline.mate(&mut rng, &team).is_none());
        assert_eq!(
            baseline.mate(&mut rng, &BaselineEvaluator::new(3.0, 0.1).into()),
            Some(Evaluator::from(BaselineEvaluator::new(2.0, 0.1)))
        );
    }

    #[test]
    fn test_mutation_tag_only_for_trees() {
        let mut rng = Pcg64Mcg::seed_from_u64(62);
        let params = TreeHyperparams::default();
        let tree = Evaluator::from(TreeEvaluator::random(&mut rng, 2, &[0, 1], 2, params));
        assert_eq!(tree.mutation_tag(), Some(MutationTag::Random));
        let mutated = tree.mutate(&mut rng, MutationCategory::Medium).unwrap();
        assert_eq!(mutated.mutation_tag(), Some(MutationTag::Medium));
        assert_eq!(mixed_team(&mut rng).mutation_tag(), None);
    }
}
