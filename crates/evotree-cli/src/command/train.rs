use std::path::PathBuf;

use evotree_evaluator::{GradientStep, QuasiNewton, Strategy, TreeHyperparams, samples};
use evotree_training::genetic::{Population, PopulationEvolver, TreeTemplate};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::{
    model::EvaluatorModel,
    util::{self, Output},
};

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StrategyKind {
    /// Single bounded gradient step per update
    #[default]
    GradientStep,
    /// Bounded limited-memory quasi-Newton iterations per update
    QuasiNewton,
}

impl StrategyKind {
    fn strategy(self) -> Strategy {
        match self {
            Self::GradientStep => GradientStep::default().into(),
            Self::QuasiNewton => QuasiNewton::default().into(),
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
enum EvolutionPhase {
    #[default]
    Exploration,
    Transition,
    Convergence,
}

impl EvolutionPhase {
    fn from_generation(generation: usize) -> Self {
        match generation {
            0..30 => Self::Exploration,
            30..80 => Self::Transition,
            _ => Self::Convergence,
        }
    }
}

const ELITE_COUNT: usize = 2;
const TOURNAMENT_SIZE: usize = 3;
const PRUNE_THRESHOLD: f64 = 1e-3;

const fn crossover_rate_by_phase(phase: EvolutionPhase) -> f64 {
    match phase {
        EvolutionPhase::Exploration => 0.4,
        EvolutionPhase::Transition => 0.3,
        EvolutionPhase::Convergence => 0.2,
    }
}

const fn mutation_mix_by_phase(phase: EvolutionPhase) -> [f64; 3] {
    match phase {
        EvolutionPhase::Exploration => [0.3, 0.4, 0.3],
        EvolutionPhase::Transition => [0.5, 0.35, 0.15],
        EvolutionPhase::Convergence => [0.7, 0.25, 0.05],
    }
}

const fn evolver_by_phase(phase: EvolutionPhase) -> PopulationEvolver {
    PopulationEvolver {
        elite_count: ELITE_COUNT,
        tournament_size: TOURNAMENT_SIZE,
        crossover_rate: crossover_rate_by_phase(phase),
        mutation_mix: mutation_mix_by_phase(phase),
        prune_threshold: PRUNE_THRESHOLD,
    }
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Records JSON file produced by `generate-records`
    #[arg(long)]
    records: PathBuf,
    /// Weight optimizer used for every update
    #[arg(long, value_enum, default_value_t = StrategyKind::GradientStep)]
    strategy: StrategyKind,
    #[arg(long, default_value_t = 100)]
    generations: usize,
    #[arg(long, default_value_t = 30)]
    population: usize,
    /// Depth of freshly drawn trees
    #[arg(long, default_value_t = 3)]
    depth: usize,
    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Model name (defaults to the strategy)
    #[arg(long)]
    name: Option<String>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let TrainArg {
        records,
        strategy,
        generations,
        population,
        depth,
        seed,
        name,
        output,
    } = arg;
    anyhow::ensure!(*population > 0, "--population must be at least 1");

    let (records, dim) = util::read_records_file(records)?;
    let samples = samples(&records);
    eprintln!(
        "Loaded {} records ({} samples, {dim} inputs)",
        records.len(),
        samples.len()
    );

    let template = TreeTemplate {
        dim,
        inputs: (0..dim).collect(),
        depth: *depth,
        params: TreeHyperparams::default(),
    };
    let mut rng = Pcg64Mcg::seed_from_u64(*seed);
    let mut population = Population::random(template, *population, &mut rng);
    for generation in 0..*generations {
        let phase = EvolutionPhase::from_generation(generation);
        eprintln!("Generation #{generation} ({phase:?}):");
        let evolver = evolver_by_phase(phase);

        let accepted = population.optimize(&samples, strategy.strategy());
        population.evaluate_fitness(&samples);
        let summary = population.compute_fitness_summary();

        eprintln!(
            "  Updates accepted: {accepted}/{}",
            population.individuals().len()
        );
        eprintln!("  Fitness Stats:");
        eprintln!("    Best:     {:.6}", summary.best);
        eprintln!("    Worst:    {:.6}", summary.worst);
        eprintln!("    Mean:     {:.6}", summary.mean);
        eprintln!("    Median:   {:.6}", summary.median);
        eprintln!("    Stddev:   {:.6}", summary.std_dev);
        eprintln!("    Unusable: {}", summary.unusable);
        if let Some(best) = population.best() {
            eprintln!(
                "  Best: complexity {}, step limit {:.4}",
                best.evaluator().complexity(),
                best.step_limit()
            );
            log::debug!("best evaluator: {}", best.evaluator());
        }

        if generation + 1 < *generations {
            population = evolver.evolve(&population, &mut rng);
        }
    }

    if *generations == 0 {
        population.evaluate_fitness(&samples);
    }
    let Some(best) = population.best() else {
        anyhow::bail!("Population is empty");
    };
    if !best.fitness().is_finite() {
        log::warn!("best individual has no finite fitness");
    }
    eprintln!("Training completed ({strategy:?}).");

    let name = name.clone().unwrap_or_else(|| match strategy {
        StrategyKind::GradientStep => "gradient-step".to_owned(),
        StrategyKind::QuasiNewton => "quasi-newton".to_owned(),
    });
    let model = EvaluatorModel::new(name, best.fitness(), best.evaluator());
    Output::save_json(&model, output.clone())?;

    eprintln!();
    eprintln!("Model saved successfully");
    if let Some(path) = &output {
        eprintln!("  Path: {}", path.display());
    }
    eprintln!("  Name: {}", model.name);
    eprintln!("  Trained at: {}", model.trained_at);
    match model.final_fitness {
        Some(fitness) => eprintln!("  Final fitness: {fitness:.6}"),
        None => eprintln!("  Final fitness: none"),
    }
    eprintln!("  Complexity: {}", best.evaluator().complexity());

    Ok(())
}
