use std::path::PathBuf;

use evotree_evaluator::{Evaluator, samples};
use evotree_training::genetic;

use crate::util;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct InspectArg {
    /// Model JSON file produced by `train`
    #[arg(long)]
    model: PathBuf,
    /// Records JSON file to score the model on
    #[arg(long)]
    records: Option<PathBuf>,
}

fn variant_name(evaluator: &Evaluator) -> &'static str {
    match evaluator {
        Evaluator::Tree(_) => "tree",
        Evaluator::Team(_) => "team",
        Evaluator::Baseline(_) => "baseline",
    }
}

/// Fails if `evaluator` was built for inputs wider than `dim`.
fn check_input_width(evaluator: &Evaluator, dim: usize) -> anyhow::Result<()> {
    if let Some(required) = evaluator.dim() {
        anyhow::ensure!(
            required <= dim,
            "Model expects {required} inputs, but records only have {dim}"
        );
    }
    Ok(())
}

pub(crate) fn run(arg: &InspectArg) -> anyhow::Result<()> {
    let InspectArg { model, records } = arg;
    let model = util::read_model_file(model)?;
    let evaluator = model.to_evaluator()?;

    println!("Name: {}", model.name);
    println!("Trained at: {}", model.trained_at);
    match model.final_fitness {
        Some(fitness) => println!("Final fitness: {fitness:.6}"),
        None => println!("Final fitness: none"),
    }
    println!("Variant: {}", variant_name(&evaluator));
    println!("Complexity: {}", evaluator.complexity());
    println!("Inputs: {:?}", evaluator.list_inputs());
    println!("Stable: {}", evaluator.is_stable());
    if let Some(tag) = evaluator.mutation_tag() {
        println!("Mutation tag: {tag}");
    }

    if let Some(path) = records {
        let (records, dim) = util::read_records_file(path)?;
        check_input_width(&evaluator, dim)?;
        let samples = samples(&records);
        println!();
        println!("Records: {} ({} samples)", records.len(), samples.len());
        println!("Objective: {:.6}", evaluator.objective(&samples));
        println!("Fitness: {:.6}", genetic::fitness(&evaluator, &samples));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use evotree_evaluator::{BaselineEvaluator, TreeEvaluator, TreeHyperparams};
    use evotree_program::{Node, Program};

    use super::*;

    #[test]
    fn test_input_width_uses_declared_dimension() {
        // reads only input 0 but is declared over 4 inputs
        let program = Program::new(Node::input(1.0, 0), 4).unwrap();
        let tree = Evaluator::from(TreeEvaluator::new(program, TreeHyperparams::default()));
        assert!(check_input_width(&tree, 2).is_err());
        assert!(check_input_width(&tree, 4).is_ok());
        assert!(check_input_width(&tree, 6).is_ok());

        let baseline = Evaluator::from(BaselineEvaluator::new(1.0, 0.1));
        assert!(check_input_width(&baseline, 0).is_ok());
    }
}
