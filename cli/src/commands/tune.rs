//! Tune command implementation
//!
//! Runs a synthetic blocked kernel whose cost depends on how well the block
//! size matches the problem size, and lets the search policy find the match.

use anyhow::{Context, Result};
use cadence_tuning::{
    make_candidate_set, make_variable_value, ExhaustiveSearch, StatisticalCategory, Tuner,
    TuningValue, ValueType, VariableId, VariableInfo,
};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

use crate::output;

const SIZES: [i64; 4] = [1, 16, 1024, 2048];
const SCHEDULES: [&str; 2] = ["static", "dynamic"];

#[derive(Args, Debug)]
pub struct TuneArgs {
    /// Contexts per problem size
    #[arg(short, long, default_value = "8")]
    pub iterations: usize,

    /// Print the converged answers as JSON
    #[arg(long)]
    pub json: bool,
}

struct Playground {
    tuner: Tuner,
    policy: Arc<ExhaustiveSearch>,
    problem_size: VariableId,
    block_size: VariableId,
    schedule: VariableId,
}

impl Playground {
    fn new() -> Result<Self> {
        let policy = Arc::new(ExhaustiveSearch::new());
        let tuner = Tuner::new(policy.clone());

        let sizes = || -> Result<VariableInfo> {
            Ok(VariableInfo::new(
                ValueType::Int64,
                StatisticalCategory::Ratio,
                make_candidate_set(SIZES.len(), &SIZES)?,
            ))
        };
        let problem_size = tuner.declare_input_type("problem_size", sizes()?)?;
        let block_size = tuner.declare_output_type("block_size", sizes()?)?;
        let schedule = tuner.declare_output_type(
            "schedule",
            VariableInfo::new(
                ValueType::Categorical,
                StatisticalCategory::Categorical,
                make_candidate_set(SCHEDULES.len(), &SCHEDULES)?,
            ),
        )?;

        Ok(Self {
            tuner,
            policy,
            problem_size,
            block_size,
            schedule,
        })
    }

    /// Simulated kernel cost in microseconds
    fn cost(problem: i64, block: i64, schedule: &str) -> u64 {
        let ideal = (problem as f64).sqrt().max(1.0);
        let miss = ((block as f64).log2() - ideal.log2()).abs();
        let imbalance = if schedule == "dynamic" && problem < 64 { 40.0 } else { 0.0 };
        (100.0 + miss * 50.0 + imbalance) as u64
    }

    fn run_once(&self, problem: i64) -> Result<()> {
        let ctx = self.tuner.get_new_context_id();
        self.tuner.begin_context(ctx)?;
        self.tuner
            .set_input_values(ctx, &[make_variable_value(self.problem_size, problem)])?;

        let mut answer = [
            make_variable_value(self.block_size, SIZES[0]),
            make_variable_value(self.schedule, SCHEDULES[0]),
        ];
        self.tuner.request_output_values(ctx, &mut answer)?;

        let block = answer[0].value.as_int().context("block_size is not an integer")?;
        let schedule = answer[1].value.as_str().unwrap_or(SCHEDULES[0]);
        std::thread::sleep(Duration::from_micros(Self::cost(problem, block, schedule)));

        self.tuner.end_context(ctx)?;
        Ok(())
    }

    fn best(&self, problem: i64) -> (Option<TuningValue>, Option<TuningValue>, bool) {
        let inputs = [make_variable_value(self.problem_size, problem)];
        (
            self.policy.best(self.block_size, &inputs),
            self.policy.best(self.schedule, &inputs),
            self.policy.converged(self.block_size, &inputs),
        )
    }
}

fn show(value: &Option<TuningValue>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

pub fn run(args: TuneArgs) -> Result<()> {
    let playground = Playground::new()?;

    for _ in 0..args.iterations {
        for problem in SIZES {
            playground.run_once(problem)?;
        }
    }

    if args.json {
        let answers: Vec<serde_json::Value> = SIZES
            .iter()
            .map(|&problem| {
                let (block, schedule, converged) = playground.best(problem);
                serde_json::json!({
                    "problem_size": problem,
                    "block_size": block,
                    "schedule": schedule,
                    "converged": converged,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&answers)?);
        return Ok(());
    }

    output::header("Converged answers");
    for problem in SIZES {
        let (block, schedule, converged) = playground.best(problem);
        println!(
            "  problem_size={:<6} block_size={:<6} schedule={}",
            problem,
            show(&block),
            show(&schedule)
        );
        if !converged {
            output::warning(&format!(
                "problem_size={} has untried candidates; raise --iterations",
                problem
            ));
        }
    }
    output::success(&format!(
        "{} contexts evaluated",
        args.iterations * SIZES.len()
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_prefers_matching_block() {
        assert!(Playground::cost(1024, 16, "static") < Playground::cost(1024, 2048, "static"));
        assert!(Playground::cost(1, 1, "static") < Playground::cost(1, 1, "dynamic"));
    }

    #[test]
    fn test_playground_answers_are_candidates() {
        let playground = Playground::new().unwrap();
        for _ in 0..6 {
            playground.run_once(16).unwrap();
        }
        let (block, schedule, converged) = playground.best(16);
        assert!(converged);
        assert!(SIZES.contains(&block.unwrap().as_int().unwrap()));
        assert!(SCHEDULES.contains(&schedule.unwrap().as_str().unwrap()));
    }
}
