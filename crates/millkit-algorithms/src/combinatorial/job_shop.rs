//! Job-shop scheduling by Giffler-Thompson active-schedule generation.
//!
//! At every step the operation with the earliest possible completion fixes a
//! machine; the conflict set is every ready operation on that machine that
//! could start before that completion, and the dispatch rule picks one.
//! The result is always an active schedule, so precedence and machine
//! capacity hold by construction; both are still re-checked on the output.

use crate::nested::{nested_index, nested_number};
use millkit_kernel::{
    Algorithm, AlgorithmError, AlgorithmMeta, Domain, FieldSpec, ParamReader, ResultEnvelope,
    SafetyClass,
};
use serde::Serialize;
use serde_json::{Value, json};

pub const RULES: &[&str] = &["mwkr", "spt", "lpt", "fifo"];
const MAX_JOBS: usize = 100;
const MAX_OPERATIONS: usize = 50;
const MAX_MACHINES: usize = 100;

pub struct JobShop;

static META: AlgorithmMeta = AlgorithmMeta {
    id: "job_shop",
    name: "Job-Shop Scheduling",
    description: "Builds an active job-shop schedule with the Giffler-Thompson algorithm and a dispatch rule, reporting makespan, utilisation, a lower bound and due-date tardiness.",
    formula: "C* = min_{o ∈ ready} (max(r_job, r_mach) + p_o),  conflict = {o on m* : est(o) < C*},  C_max ≥ max(max_j Σ p_j, max_m Σ p_m)",
    reference: "Giffler, B., Thompson, G. L. (1960). Algorithms for solving production-scheduling problems. Operations Research 8(4), 487-503.",
    safety_class: SafetyClass::Standard,
    domain: Domain::Combinatorial,
    inputs: &[
        FieldSpec::required("jobs", "-", "per job, its ordered operations {machine, duration}"),
        FieldSpec::optional("machines", "-", "machine count, default highest index + 1"),
        FieldSpec::optional("rule", "-", "mwkr | spt | lpt | fifo (default mwkr)"),
        FieldSpec::optional("due_dates", "min", "due date per job"),
    ],
    outputs: &[
        FieldSpec::output("schedule", "-", "job, operation, machine, start, end"),
        FieldSpec::output("makespan", "min", "completion of the last operation"),
        FieldSpec::output("machine_utilization", "-", "busy time / makespan per machine"),
        FieldSpec::output("lower_bound", "min", "max of longest job and busiest machine"),
        FieldSpec::output("optimality_gap", "-", "(makespan − lower_bound) / lower_bound"),
        FieldSpec::output("optimal", "-", "makespan equals the lower bound"),
        FieldSpec::output("precedence_violations", "-", "operations starting before their predecessor ends"),
        FieldSpec::output("machine_overlaps", "-", "pairs of overlapping operations on one machine"),
        FieldSpec::output("tardiness", "-", "total, maximum and late jobs; null without due dates"),
        FieldSpec::output("all_constraints_met", "-", "no violations, overlaps or late jobs"),
    ],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    MostWorkRemaining,
    ShortestProcessingTime,
    LongestProcessingTime,
    FirstInFirstOut,
}

#[derive(Debug, Clone, Copy)]
struct Operation {
    machine: usize,
    duration: f64,
}

#[derive(Debug, Clone)]
pub struct JobShopInput {
    jobs: Vec<Vec<Operation>>,
    machines: usize,
    rule: Rule,
    due_dates: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledOperation {
    pub job: usize,
    pub operation: usize,
    pub machine: usize,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Serialize)]
pub struct Tardiness {
    pub total: f64,
    pub maximum: f64,
    pub late_jobs: Vec<usize>,
}

#[derive(Debug, Serialize)]
pub struct JobShopOutput {
    pub schedule: Vec<ScheduledOperation>,
    pub makespan: f64,
    pub machine_utilization: Vec<f64>,
    pub lower_bound: f64,
    pub optimality_gap: f64,
    pub optimal: bool,
    pub precedence_violations: usize,
    pub machine_overlaps: usize,
    pub tardiness: Option<Tardiness>,
    pub all_constraints_met: bool,
}

/// Ready operation of `job` with its earliest start.
struct Candidate {
    job: usize,
    start: f64,
    duration: f64,
    remaining: f64,
}

fn pick(conflict: &[Candidate], rule: Rule) -> usize {
    let key = |c: &Candidate| match rule {
        Rule::MostWorkRemaining => -c.remaining,
        Rule::ShortestProcessingTime => c.duration,
        Rule::LongestProcessingTime => -c.duration,
        Rule::FirstInFirstOut => c.start,
    };
    conflict
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| key(a).total_cmp(&key(b)).then(a.job.cmp(&b.job)))
        .map_or(0, |(i, _)| i)
}

fn giffler_thompson(jobs: &[Vec<Operation>], machines: usize, rule: Rule) -> Vec<ScheduledOperation> {
    let mut next = vec![0usize; jobs.len()];
    let mut job_ready = vec![0.0f64; jobs.len()];
    let mut machine_ready = vec![0.0f64; machines];
    let mut remaining: Vec<f64> = jobs
        .iter()
        .map(|ops| ops.iter().map(|o| o.duration).sum())
        .collect();
    let total: usize = jobs.iter().map(Vec::len).sum();
    let mut schedule = Vec::with_capacity(total);

    for _ in 0..total {
        let ready: Vec<(usize, Operation, f64)> = (0..jobs.len())
            .filter(|&j| next[j] < jobs[j].len())
            .map(|j| {
                let op = jobs[j][next[j]];
                (j, op, job_ready[j].max(machine_ready[op.machine]))
            })
            .collect();
        let Some(&(_, star, _)) = ready
            .iter()
            .min_by(|a, b| (a.2 + a.1.duration).total_cmp(&(b.2 + b.1.duration)))
        else {
            break;
        };
        let completion = ready
            .iter()
            .map(|(_, op, est)| est + op.duration)
            .fold(f64::INFINITY, f64::min);
        let conflict: Vec<Candidate> = ready
            .iter()
            .filter(|(_, op, est)| op.machine == star.machine && *est < completion)
            .map(|&(job, op, start)| Candidate {
                job,
                start,
                duration: op.duration,
                remaining: remaining[job],
            })
            .collect();
        // A zero-length operation on an idle machine can tie with its own
        // completion; fall back to the operation that fixed the machine.
        let chosen = if conflict.is_empty() {
            ready
                .iter()
                .find(|(_, op, _)| op.machine == star.machine)
                .map(|&(job, op, start)| Candidate {
                    job,
                    start,
                    duration: op.duration,
                    remaining: remaining[job],
                })
        } else {
            let i = pick(&conflict, rule);
            conflict.into_iter().nth(i)
        };
        let Some(c) = chosen else {
            break;
        };

        let end = c.start + c.duration;
        schedule.push(ScheduledOperation {
            job: c.job,
            operation: next[c.job],
            machine: star.machine,
            start: c.start,
            end,
        });
        next[c.job] += 1;
        job_ready[c.job] = end;
        machine_ready[star.machine] = end;
        remaining[c.job] -= c.duration;
    }
    schedule
}

/// `(precedence violations, machine overlaps)` found in a finished schedule.
fn audit(schedule: &[ScheduledOperation], machines: usize) -> (usize, usize) {
    let mut by_job: Vec<&ScheduledOperation> = schedule.iter().collect();
    by_job.sort_by_key(|s| (s.job, s.operation));
    let precedence = by_job
        .windows(2)
        .filter(|w| w[0].job == w[1].job && w[1].start < w[0].end)
        .count();

    let mut overlaps = 0;
    for m in 0..machines {
        let mut ops: Vec<&ScheduledOperation> =
            schedule.iter().filter(|s| s.machine == m).collect();
        ops.sort_by(|a, b| a.start.total_cmp(&b.start));
        overlaps += ops.windows(2).filter(|w| w[1].start < w[0].end).count();
    }
    (precedence, overlaps)
}

impl Algorithm for JobShop {
    type Input = JobShopInput;
    type Output = JobShopOutput;

    fn meta(&self) -> &'static AlgorithmMeta {
        &META
    }

    fn example(&self) -> Value {
        json!({
            "jobs": [
                [{"machine": 0, "duration": 3.0}, {"machine": 1, "duration": 2.0}, {"machine": 2, "duration": 2.0}],
                [{"machine": 0, "duration": 2.0}, {"machine": 2, "duration": 1.0}, {"machine": 1, "duration": 4.0}],
                [{"machine": 1, "duration": 4.0}, {"machine": 2, "duration": 3.0}]
            ],
            "rule": "mwkr",
            "due_dates": [10.0, 12.0, 9.0]
        })
    }

    fn parse(&self, params: &mut ParamReader<'_>) -> JobShopInput {
        let items = params.required_array("jobs");
        if params.has("jobs") {
            params.ensure_count("jobs", items.len(), 1, MAX_JOBS);
        }
        let mut jobs = Vec::with_capacity(items.len());
        for (j, job) in items.iter().enumerate() {
            let Some(ops) = job.as_array() else {
                params.error("jobs", format!("jobs[{j}] must be an array of operations"));
                continue;
            };
            if ops.is_empty() || ops.len() > MAX_OPERATIONS {
                params.error(
                    "jobs",
                    format!("jobs[{j}] must have between 1 and {MAX_OPERATIONS} operations"),
                );
                continue;
            }
            let mut parsed = Vec::with_capacity(ops.len());
            for (k, op) in ops.iter().enumerate() {
                let path = format!("jobs[{j}][{k}]");
                let machine = nested_index(params, "jobs", op, "machine", &path, MAX_MACHINES);
                let duration = nested_number(params, "jobs", op, "duration", &path);
                if let (Some(machine), Some(duration)) = (machine, duration) {
                    parsed.push(Operation { machine, duration });
                }
            }
            jobs.push(parsed);
        }

        let highest = jobs.iter().flatten().map(|o| o.machine).max().unwrap_or(0);
        let machines = params.optional_usize("machines", highest.saturating_add(1));
        if params.ensure_count("machines", machines, 1, MAX_MACHINES) && !params.failed("jobs") {
            params.ensure(
                "jobs",
                highest < machines,
                format!("machine index {highest} is out of range for {machines} machines"),
            );
        }
        let rule = match params.choice("rule", RULES, "mwkr") {
            "spt" => Rule::ShortestProcessingTime,
            "lpt" => Rule::LongestProcessingTime,
            "fifo" => Rule::FirstInFirstOut,
            _ => Rule::MostWorkRemaining,
        };
        let due_dates = params.optional_f64_array("due_dates");
        if let Some(due) = &due_dates
            && params.ensure_len("due_dates", due.len(), items.len())
        {
            params.ensure(
                "due_dates",
                due.iter().all(|d| *d >= 0.0),
                "must not be negative",
            );
        }
        JobShopInput {
            jobs,
            machines,
            rule,
            due_dates,
        }
    }

    fn calculate(
        &self,
        input: &JobShopInput,
    ) -> Result<ResultEnvelope<JobShopOutput>, AlgorithmError> {
        let machines = input.machines;
        if input.jobs.is_empty()
            || machines == 0
            || input.jobs.iter().flatten().any(|o| o.machine >= machines)
        {
            return Err(AlgorithmError::InvalidInput(
                "need at least one job and machine indices below the machine count".into(),
            ));
        }

        let mut schedule = giffler_thompson(&input.jobs, machines, input.rule);
        let (precedence_violations, machine_overlaps) = audit(&schedule, machines);
        schedule.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.machine.cmp(&b.machine)));

        let makespan = schedule.iter().map(|s| s.end).fold(0.0, f64::max);
        let mut busy = vec![0.0; machines];
        for s in &schedule {
            busy[s.machine] += s.end - s.start;
        }
        let longest_job = input
            .jobs
            .iter()
            .map(|ops| ops.iter().map(|o| o.duration).sum::<f64>())
            .fold(0.0, f64::max);
        let lower_bound = longest_job.max(busy.iter().copied().fold(0.0, f64::max));
        let machine_utilization = busy
            .iter()
            .map(|b| if makespan > 0.0 { b / makespan } else { 0.0 })
            .collect();
        let optimality_gap = if lower_bound > 0.0 {
            (makespan - lower_bound) / lower_bound
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let tardiness = input.due_dates.as_ref().map(|due| {
            let mut completion = vec![0.0f64; input.jobs.len()];
            for s in &schedule {
                completion[s.job] = completion[s.job].max(s.end);
            }
            let lateness: Vec<f64> = completion
                .iter()
                .zip(due)
                .map(|(c, d)| (c - d).max(0.0))
                .collect();
            let late_jobs: Vec<usize> = (0..lateness.len()).filter(|&j| lateness[j] > 0.0).collect();
            if !late_jobs.is_empty() {
                warnings.push(format!("{} job(s) finish after their due date", late_jobs.len()));
            }
            Tardiness {
                total: lateness.iter().sum(),
                maximum: lateness.iter().copied().fold(0.0, f64::max),
                late_jobs,
            }
        });
        let on_time = tardiness.as_ref().is_none_or(|t| t.late_jobs.is_empty());

        Ok(ResultEnvelope::with_warnings(
            JobShopOutput {
                schedule,
                makespan,
                machine_utilization,
                lower_bound,
                optimality_gap,
                optimal: makespan <= lower_bound,
                precedence_violations,
                machine_overlaps,
                tardiness,
                all_constraints_met: precedence_violations == 0 && machine_overlaps == 0 && on_time,
            },
            warnings,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{error_fields, parse, run};

    fn single_machine(rule: &str) -> Vec<usize> {
        let out = run(
            &JobShop,
            json!({
                "jobs": [
                    [{"machine": 0, "duration": 3.0}],
                    [{"machine": 0, "duration": 1.0}],
                    [{"machine": 0, "duration": 2.0}]
                ],
                "rule": rule
            }),
        )
        .result;
        assert_eq!(out.makespan, 6.0);
        assert!(out.optimal);
        out.schedule.iter().map(|s| s.job).collect()
    }

    #[test]
    fn dispatch_rules_order_a_single_machine() {
        assert_eq!(single_machine("spt"), vec![1, 2, 0]);
        assert_eq!(single_machine("lpt"), vec![0, 2, 1]);
    }

    #[test]
    fn example_schedule_is_feasible() {
        let out = run(&JobShop, JobShop.example()).result;
        assert_eq!(out.schedule.len(), 8);
        assert_eq!(out.precedence_violations, 0);
        assert_eq!(out.machine_overlaps, 0);
        assert_eq!(out.lower_bound, 10.0);
        assert!(out.makespan >= out.lower_bound);
        assert!(out.machine_utilization.iter().all(|u| (0.0..=1.0).contains(u)));
        for s in &out.schedule {
            assert!(s.end <= out.makespan);
        }
    }

    #[test]
    fn tight_due_dates_are_reported() {
        let mut p = JobShop.example();
        p["due_dates"] = json!([1.0, 1.0, 1.0]);
        let out = run(&JobShop, p);
        let t = out.result.tardiness.as_ref().unwrap();
        assert_eq!(t.late_jobs, vec![0, 1, 2]);
        assert!(!out.result.all_constraints_met);
        assert_eq!(out.warnings.len(), 1);
    }

    #[test]
    fn malformed_operations_are_reported_with_paths() {
        let (_, issues) = parse(
            &JobShop,
            json!({"jobs": [[{"machine": 0}], [{"machine": -1, "duration": 2.0}]], "machines": 1}),
        );
        let messages: Vec<&str> = issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(error_fields(&issues), vec!["jobs", "jobs"]);
        assert!(messages[0].contains("jobs[0][0].duration"));
        assert!(messages[1].contains("jobs[1][0].machine"));
    }

    #[test]
    fn huge_machine_index_is_rejected_not_overflowed() {
        let (_, issues) = parse(
            &JobShop,
            json!({"jobs": [[{"machine": u64::MAX, "duration": 1.0}]]}),
        );
        assert_eq!(error_fields(&issues), vec!["jobs"]);
        assert!(issues[0].message.contains("out of range"));
    }
}
