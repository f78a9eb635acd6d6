use std::path::PathBuf;

use evotree_evaluator::{Choice, Record, discounted_returns};
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rand_pcg::Pcg64Mcg;

use crate::util::Output;

const STATE_DIM: usize = 2;
const ACTION_DIM: usize = 2;
const TURNS_PER_EPISODE: usize = 20;
/// Probability of playing the best-looking option.
const GREEDY_RATE: f64 = 0.8;
const REWARD_NOISE: f64 = 0.1;
const ESTIMATE_NOISE: f64 = 0.5;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct GenerateRecordsArg {
    /// Number of episodes to play
    #[arg(long, default_value_t = 50)]
    episodes: usize,
    /// Candidate options per decision
    #[arg(long, default_value_t = 4)]
    options: usize,
    /// Discount factor for the reward-to-go
    #[arg(long, default_value_t = 0.9)]
    gamma: f64,
    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Reward the game pays for playing `action` in `state`.
fn hidden_score(state: &[f64], action: &[f64]) -> f64 {
    2.0 * state[0] * action[0] - action[1] * action[1] + 0.5 * state[1]
}

fn play_episode<R>(rng: &mut R, options: usize, gamma: f64) -> Vec<Record>
where
    R: Rng + ?Sized,
{
    let mut records = Vec::with_capacity(TURNS_PER_EPISODE);
    let mut rewards = Vec::with_capacity(TURNS_PER_EPISODE);
    for _ in 0..TURNS_PER_EPISODE {
        let state: Vec<f64> = (0..STATE_DIM).map(|_| rng.random_range(-1.0..1.0)).collect();
        let choices: Vec<Choice> = (0..options)
            .map(|_| {
                let action: Vec<f64> =
                    (0..ACTION_DIM).map(|_| rng.random_range(-1.0..1.0)).collect();
                let noise: f64 = rng.sample(StandardNormal);
                let output = hidden_score(&state, &action) + ESTIMATE_NOISE * noise;
                let mut input = state.clone();
                input.extend(action);
                Choice { input, output }
            })
            .collect();

        let selected_option = if rng.random_bool(GREEDY_RATE) {
            choices
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| a.output.total_cmp(&b.output))
                .map_or(0, |(i, _)| i)
        } else {
            rng.random_range(0..choices.len())
        };
        let selected = &choices[selected_option];
        let noise: f64 = rng.sample(StandardNormal);
        rewards.push(hidden_score(&state, &selected.input[STATE_DIM..]) + REWARD_NOISE * noise);

        records.push(Record {
            state,
            options: choices,
            selected_option,
            sum_future_rewards: 0.0,
        });
    }

    for (record, ret) in std::iter::zip(&mut records, discounted_returns(&rewards, gamma)) {
        record.sum_future_rewards = ret;
    }
    records
}

pub(crate) fn run(arg: &GenerateRecordsArg) -> anyhow::Result<()> {
    let GenerateRecordsArg {
        episodes,
        options,
        gamma,
        seed,
        output,
    } = arg;
    anyhow::ensure!(*options > 0, "--options must be at least 1");
    anyhow::ensure!(
        (0.0..=1.0).contains(gamma),
        "--gamma must be in [0, 1], got {gamma}"
    );

    let mut rng = Pcg64Mcg::seed_from_u64(*seed);
    let records: Vec<Record> = (0..*episodes)
        .flat_map(|_| play_episode(&mut rng, *options, *gamma))
        .collect();
    eprintln!(
        "Generated {} records from {episodes} episodes ({} inputs per option)",
        records.len(),
        STATE_DIM + ACTION_DIM
    );

    Output::save_json(&records, output.clone())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_records_are_consistent() {
        let mut rng = Pcg64Mcg::seed_from_u64(90);
        let records = play_episode(&mut rng, 3, 0.5);
        assert_eq!(records.len(), TURNS_PER_EPISODE);
        for record in &records {
            record.validate().unwrap();
            assert_eq!(record.options.len(), 3);
            assert_eq!(record.options[0].input.len(), STATE_DIM + ACTION_DIM);
            assert_eq!(&record.options[0].input[..STATE_DIM], &record.state[..]);
        }
    }

    #[test]
    fn test_reward_to_go_discounts_the_tail() {
        let mut rng = Pcg64Mcg::seed_from_u64(91);
        let records = play_episode(&mut rng, 2, 0.0);
        // with gamma 0 the reward-to-go is the immediate reward
        for record in &records {
            let selected = &record.options[record.selected_option];
            let expected = hidden_score(&record.state, &selected.input[STATE_DIM..]);
            assert!((record.sum_future_rewards - expected).abs() < 1.0);
        }
    }
}
