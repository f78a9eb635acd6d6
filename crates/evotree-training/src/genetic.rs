//! Genetic algorithm over evaluators.
//!
//! Each generation follows this cycle:
//!
//! 1. **Optimize** - every individual runs one weight update on the training samples and
//!    adapts its own step limit to the outcome
//! 2. **Evaluate Fitness** - fitness is the negated objective; unstable or non-finite
//!    individuals get `-∞`
//! 3. **Elite Selection** - the best stable individuals are carried over unchanged
//! 4. **Tournament Selection** - parents are drawn among stable individuals only
//! 5. **Crossover / Mutation** - a child is either mated from two parents or mutated from
//!    one, then pruned
//!
//! # Adaptive Step Limit
//!
//! Each [`Individual`] keeps its own relative step limit for
//! [`GradientStep`](evotree_evaluator::GradientStep). A rejected update halves it (down to
//! [`STEP_LIMIT_FLOOR`]); an accepted update grows it by 20% (up to [`STEP_LIMIT_CAP`]).
//!
//! # Fallback
//!
//! Evaluator-level mutation and crossover give up after a bounded number of attempts when
//! every child exceeds the complexity bound. The evolver then inserts a fresh random
//! individual, so a generation always reaches the population size.
//!
//! # Parallelization
//!
//! Optimization and fitness evaluation run one scoped thread per individual. Each thread
//! owns its individual; the samples are shared read-only.

use std::thread;

use evotree_evaluator::{Evaluator, Sample, Strategy, TreeEvaluator, TreeHyperparams};
use evotree_program::MutationCategory;
use rand::{Rng, seq::IndexedRandom};

pub const STEP_LIMIT_INITIAL: f64 = 0.1;
pub const STEP_LIMIT_FLOOR: f64 = 1e-4;
pub const STEP_LIMIT_CAP: f64 = 1.0;
const STEP_LIMIT_GROWTH: f64 = 1.2;
const STEP_LIMIT_SHRINK: f64 = 0.5;

/// How fresh random individuals are drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeTemplate {
    pub dim: usize,
    /// Input indices every fresh tree references.
    pub inputs: Vec<usize>,
    pub depth: usize,
    pub params: TreeHyperparams,
}

impl TreeTemplate {
    /// Draws a fresh tree evaluator referencing every index in `inputs`.
    pub fn random_evaluator<R>(&self, rng: &mut R) -> Evaluator
    where
        R: Rng + ?Sized,
    {
        TreeEvaluator::random(rng, self.dim, &self.inputs, self.depth, self.params).into()
    }
}

/// One evaluator with its training state.
#[derive(Debug, Clone)]
pub struct Individual {
    evaluator: Evaluator,
    fitness: f64,
    step_limit: f64,
    failures: usize,
}

impl Individual {
    /// Creates an unevaluated individual.
    ///
    /// Fitness starts at `-∞` until [`Population::evaluate_fitness`] runs, and the step
    /// limit starts at [`STEP_LIMIT_INITIAL`].
    #[must_use]
    pub fn new(evaluator: Evaluator) -> Self {
        Self {
            evaluator,
            fitness: f64::NEG_INFINITY,
            step_limit: STEP_LIMIT_INITIAL,
            failures: 0,
        }
    }

    /// Returns the evaluator of this individual.
    #[must_use]
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Negated objective from the last evaluation; higher is better.
    #[must_use]
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// Relative step limit passed to the next gradient step.
    ///
    /// Grows after accepted updates and shrinks after rejected ones, within
    /// [`STEP_LIMIT_FLOOR`] and [`STEP_LIMIT_CAP`].
    #[must_use]
    pub fn step_limit(&self) -> f64 {
        self.step_limit
    }

    /// Consecutive rejected updates.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.failures
    }

    fn optimize(&mut self, samples: &[Sample<'_>], strategy: Strategy) -> bool {
        let strategy = strategy.with_step_limit(self.step_limit);
        let (next, report) = self.evaluator.update(samples, &strategy);
        self.evaluator = next;
        if report.success {
            self.step_limit = (self.step_limit * STEP_LIMIT_GROWTH).min(STEP_LIMIT_CAP);
            self.failures = 0;
        } else {
            self.step_limit = (self.step_limit * STEP_LIMIT_SHRINK).max(STEP_LIMIT_FLOOR);
            self.failures += 1;
        }
        report.success
    }

    fn is_breedable(&self) -> bool {
        self.evaluator.is_stable() && self.fitness.is_finite()
    }
}

/// Fitness of `evaluator` on `samples`: `-objective`, or `-∞` if unusable.
#[must_use]
pub fn fitness(evaluator: &Evaluator, samples: &[Sample<'_>]) -> f64 {
    if !evaluator.is_stable() {
        return f64::NEG_INFINITY;
    }
    let objective = evaluator.objective(samples);
    if objective.is_finite() {
        -objective
    } else {
        f64::NEG_INFINITY
    }
}

/// A population of individuals evolved together.
#[derive(Debug, Clone)]
pub struct Population {
    template: TreeTemplate,
    individuals: Vec<Individual>,
}

impl Population {
    /// Creates a population of fresh random tree evaluators.
    ///
    /// # Arguments
    ///
    /// * `template` - Shape of the random trees, also used for fallback draws while evolving
    /// * `count` - Number of individuals in the population
    /// * `rng` - Random number generator
    #[must_use]
    pub fn random<R>(template: TreeTemplate, count: usize, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let individuals = (0..count)
            .map(|_| Individual::new(template.random_evaluator(rng)))
            .collect();
        Self {
            template,
            individuals,
        }
    }

    /// Returns all individuals in this population.
    #[must_use]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    /// Best individual of the last evaluation.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.individuals.first()
    }

    /// Runs one weight update per individual in parallel.
    ///
    /// Each individual fits its evaluator to `samples` with `strategy`, using its own step
    /// limit for gradient steps, and adapts that limit to the outcome.
    ///
    /// # Arguments
    ///
    /// * `samples` - Training samples flattened from the records
    /// * `strategy` - Weight optimizer for every update
    ///
    /// # Returns
    ///
    /// The number of accepted updates
    pub fn optimize(&mut self, samples: &[Sample<'_>], strategy: Strategy) -> usize {
        thread::scope(|s| {
            for ind in &mut self.individuals {
                s.spawn(move || ind.optimize(samples, strategy));
            }
        });

        let accepted = self.individuals.iter().filter(|ind| ind.failures == 0).count();
        log::debug!("{accepted}/{} updates accepted", self.individuals.len());
        accepted
    }

    /// Evaluates fitness for all individuals in parallel.
    ///
    /// Fitness is the negated objective on `samples` (see [`fitness`]). After evaluation,
    /// individuals are sorted by fitness in descending order (best first).
    pub fn evaluate_fitness(&mut self, samples: &[Sample<'_>]) {
        thread::scope(|s| {
            for ind in &mut self.individuals {
                s.spawn(move || {
                    ind.fitness = fitness(&ind.evaluator, samples);
                });
            }
        });

        // sort by fitness descending
        self.individuals
            .sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
    }

    /// Computes descriptive statistics for fitness across all individuals.
    #[must_use]
    pub fn compute_fitness_summary(&self) -> FitnessSummary {
        FitnessSummary::new(self.individuals.iter().map(|ind| ind.fitness))
    }
}

/// Fitness distribution of a population.
///
/// Statistics cover finite fitness values only; the rest are counted in `unusable`.
#[derive(Debug, Clone, PartialEq)]
pub struct FitnessSummary {
    pub best: f64,
    pub worst: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub unusable: usize,
}

impl FitnessSummary {
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn new<I>(values: I) -> Self
    where
        I: IntoIterator<Item = f64>,
    {
        let (mut finite, rest): (Vec<f64>, Vec<f64>) =
            values.into_iter().partition(|v| v.is_finite());
        let unusable = rest.len();
        if finite.is_empty() {
            return Self {
                best: f64::NEG_INFINITY,
                worst: f64::NEG_INFINITY,
                mean: f64::NAN,
                median: f64::NAN,
                std_dev: f64::NAN,
                unusable,
            };
        }
        finite.sort_by(f64::total_cmp);
        let n = finite.len() as f64;
        let mean = finite.iter().sum::<f64>() / n;
        let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            best: finite[finite.len() - 1],
            worst: finite[0],
            mean,
            median: finite[finite.len() / 2],
            std_dev: variance.sqrt(),
            unusable,
        }
    }
}

/// Controls how one generation turns into the next.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationEvolver {
    /// Number of top stable individuals preserved unchanged (elitism)
    pub elite_count: usize,
    /// Tournament size for selection (larger = stronger selection pressure)
    pub tournament_size: usize,
    /// Probability of producing a child by crossover instead of mutation, in `[0, 1]`
    pub crossover_rate: f64,
    /// Relative frequency of small, medium and large mutations
    pub mutation_mix: [f64; 3],
    /// Children are pruned with this weight threshold
    pub prune_threshold: f64,
}

impl Default for PopulationEvolver {
    fn default() -> Self {
        Self {
            elite_count: 2,
            tournament_size: 3,
            crossover_rate: 0.3,
            mutation_mix: [0.6, 0.3, 0.1],
            prune_threshold: 1e-3,
        }
    }
}

impl PopulationEvolver {
    /// Creates the next generation with the same size as `population`.
    ///
    /// # Panics
    ///
    /// Panics if `population` is not sorted by fitness (see [`Population::evaluate_fitness`]).
    #[must_use]
    pub fn evolve<R>(&self, population: &Population, rng: &mut R) -> Population
    where
        R: Rng + ?Sized,
    {
        assert!(
            population
                .individuals
                .is_sorted_by(|a, b| a.fitness >= b.fitness)
        );
        let breeders: Vec<&Individual> = population
            .individuals
            .iter()
            .filter(|ind| ind.is_breedable())
            .collect();

        // elite selection
        let mut next_individuals: Vec<Individual> = breeders
            .iter()
            .take(self.elite_count)
            .map(|&ind| ind.clone())
            .collect();

        let mut fallbacks = 0;
        while next_individuals.len() < population.individuals.len() {
            let child = self.breed(&breeders, rng).unwrap_or_else(|| {
                fallbacks += 1;
                population.template.random_evaluator(rng)
            });
            next_individuals.push(Individual::new(child.prune(self.prune_threshold)));
        }
        if fallbacks > 0 {
            log::debug!("{fallbacks} children replaced by random individuals");
        }

        Population {
            template: population.template.clone(),
            individuals: next_individuals,
        }
    }

    fn breed<R>(&self, breeders: &[&Individual], rng: &mut R) -> Option<Evaluator>
    where
        R: Rng + ?Sized,
    {
        let p1 = tournament_select(breeders, self.tournament_size, rng)?;
        if rng.random_bool(self.crossover_rate) {
            let p2 = tournament_select(breeders, self.tournament_size, rng)?;
            p1.evaluator.mate(rng, &p2.evaluator)
        } else {
            let category = self.mutation_category(rng);
            p1.evaluator.mutate(rng, category)
        }
    }

    fn mutation_category<R>(&self, rng: &mut R) -> MutationCategory
    where
        R: Rng + ?Sized,
    {
        let choices: Vec<_> = MutationCategory::ALL
            .into_iter()
            .zip(self.mutation_mix)
            .collect();
        choices
            .choose_weighted(rng, |&(_, w)| w)
            .map_or(MutationCategory::Medium, |&(category, _)| category)
    }
}

/// Selects an individual using tournament selection.
///
/// Returns `None` if `population` is empty.
fn tournament_select<'a, R>(
    population: &[&'a Individual],
    tournament_size: usize,
    rng: &mut R,
) -> Option<&'a Individual>
where
    R: Rng + ?Sized,
{
    assert!(tournament_size > 0);
    population
        .choose_multiple(rng, tournament_size)
        .max_by(|a, b| a.fitness.total_cmp(&b.fitness))
        .copied()
}

#[cfg(test)]
mod tests {
    use evotree_evaluator::{
        BaselineEvaluator, Choice, GradientStep, QuasiNewton, Record, samples,
    };
    use evotree_program::{Node, Program};
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    /// Records whose outputs follow `y = 2·x0 − x2`.
    fn records(rng: &mut Pcg64Mcg) -> Vec<Record> {
        (0..10)
            .map(|_| Record {
                state: vec![],
                options: (0..3)
                    .map(|_| {
                        let input: Vec<f64> = (0..3).map(|_| rng.random_range(-1.0..1.0)).collect();
                        let output = 2.0 * input[0] - input[2];
                        Choice { input, output }
                    })
                    .collect(),
                selected_option: 0,
                sum_future_rewards: 0.0,
            })
            .collect()
    }

    fn template() -> TreeTemplate {
        TreeTemplate {
            dim: 3,
            inputs: vec![0, 1, 2],
            depth: 2,
            params: TreeHyperparams {
                learning_rate: 0.0,
                max_complexity: 40,
                ..TreeHyperparams::default()
            },
        }
    }

    fn with_fitness(evaluator: Evaluator, fitness: f64) -> Individual {
        Individual {
            fitness,
            ..Individual::new(evaluator)
        }
    }

    #[test]
    fn test_tournament_select_full_size_picks_best() {
        let mut rng = Pcg64Mcg::seed_from_u64(70);
        let individuals: Vec<Individual> = [-3.0, -1.0, -2.0]
            .into_iter()
            .map(|f| with_fitness(BaselineEvaluator::new(f, 0.0).into(), f))
            .collect();
        let refs: Vec<&Individual> = individuals.iter().collect();
        for _ in 0..10 {
            let best = tournament_select(&refs, 3, &mut rng).unwrap();
            assert_eq!(best.fitness(), -1.0);
        }
        assert!(tournament_select(&[], 2, &mut rng).is_none());
    }

    #[test]
    fn test_evaluate_fitness_sorts_and_penalizes_unusable() {
        let mut rng = Pcg64Mcg::seed_from_u64(71);
        let records = records(&mut rng);
        let samples = samples(&records);
        let mut population = Population::random(template(), 8, &mut rng);
        population.individuals.push(Individual::new(
            BaselineEvaluator::new(f64::NAN, 0.0).into(),
        ));
        population.evaluate_fitness(&samples);

        let fitness: Vec<f64> = population.individuals().iter().map(Individual::fitness).collect();
        assert!(fitness.is_sorted_by(|a, b| a >= b));
        assert_eq!(fitness[fitness.len() - 1], f64::NEG_INFINITY);
        let summary = population.compute_fitness_summary();
        assert_eq!(summary.unusable, 1);
        assert_eq!(summary.best, fitness[0]);
        assert!(summary.worst <= summary.median && summary.median <= summary.best);
    }

    #[test]
    fn test_step_limit_adapts() {
        let mut rng = Pcg64Mcg::seed_from_u64(72);
        let records = records(&mut rng);
        let samples = samples(&records);
        let strategy = Strategy::from(GradientStep::default());

        // a zero-weight constant has a zero gradient and can never improve
        let stuck = TreeEvaluator::new(
            Program::new(Node::constant(0.0, 1.0), 3).unwrap(),
            template().params,
        );
        let mut ind = Individual::new(stuck.into());
        for _ in 0..30 {
            assert!(!ind.optimize(&samples, strategy));
        }
        assert_eq!(ind.step_limit(), STEP_LIMIT_FLOOR);
        assert_eq!(ind.failures(), 30);

        let linear = TreeEvaluator::new(
            Program::new(Node::input(1.0, 0), 3).unwrap(),
            template().params,
        );
        let mut ind = Individual::new(linear.into());
        assert!(ind.optimize(&samples, strategy));
        assert!((ind.step_limit() - STEP_LIMIT_INITIAL * STEP_LIMIT_GROWTH).abs() < 1e-12);
        assert_eq!(ind.failures(), 0);
    }

    #[test]
    fn test_evolve_keeps_size_and_elites() {
        let mut rng = Pcg64Mcg::seed_from_u64(73);
        let records = records(&mut rng);
        let samples = samples(&records);
        let mut population = Population::random(template(), 12, &mut rng);
        population.evaluate_fitness(&samples);

        let evolver = PopulationEvolver::default();
        let next = evolver.evolve(&population, &mut rng);
        assert_eq!(next.individuals().len(), 12);
        for (elite, kept) in std::iter::zip(population.individuals(), next.individuals()).take(2) {
            assert_eq!(elite.evaluator(), kept.evaluator());
        }
        for ind in next.individuals() {
            assert!(ind.evaluator().complexity() <= 40);
        }
    }

    #[test]
    fn test_evolve_falls_back_without_breeders() {
        let mut rng = Pcg64Mcg::seed_from_u64(74);
        let mut population = Population::random(template(), 5, &mut rng);
        // never evaluated: every fitness is -inf
        population.individuals.sort_by(|a, b| b.fitness.total_cmp(&a.fitness));
        let next = PopulationEvolver::default().evolve(&population, &mut rng);
        assert_eq!(next.individuals().len(), 5);
        assert!(next.individuals().iter().all(|ind| ind.evaluator().is_tree()));
    }

    #[test]
    fn test_best_fitness_never_decreases() {
        let mut rng = Pcg64Mcg::seed_from_u64(75);
        let records = records(&mut rng);
        let samples = samples(&records);
        let evolver = PopulationEvolver::default();

        for strategy in [
            Strategy::from(GradientStep::default()),
            Strategy::from(QuasiNewton::default()),
        ] {
            let mut population = Population::random(template(), 10, &mut rng);
            let mut best = f64::NEG_INFINITY;
            for _ in 0..6 {
                population.optimize(&samples, strategy);
                population.evaluate_fitness(&samples);
                let summary = population.compute_fitness_summary();
                assert!(summary.best >= best);
                best = summary.best;
                population = evolver.evolve(&population, &mut rng);
            }
        }
    }

    #[test]
    fn test_summary_of_empty_population() {
        let summary = FitnessSummary::new([f64::NEG_INFINITY]);
        assert_eq!(summary.unusable, 1);
        assert!(summary.mean.is_nan());
    }
}
