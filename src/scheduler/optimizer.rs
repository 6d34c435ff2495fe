//! Optimal batch assignment by dynamic programming over request subsets.
//!
//! Given a batch of requests and a set of piles (each with pre-existing wait,
//! free slots and per-request charging time), find the assignment minimizing
//! the sum of completion times, where each pile serves its share in
//! shortest-charging-time-first (SPT) order. Ties on the sum go to the smaller
//! makespan (latest finish over all piles).
//!
//! The table is layered over piles and indexed by the bitmask of requests
//! placed so far:
//!
//! `best[j][mask]` = best (total, makespan) placing exactly `mask` on piles `0..=j`
//!
//! Each layer enumerates every submask handed to pile `j`, so the work is
//! `O(piles * 3^n)`. The batch size is capped at [`MAX_BATCH_SIZE`].
//!
//! When capacity or mode compatibility make a complete placement impossible,
//! the plan places as many requests as it can and leaves the rest unassigned.

/// Largest batch the optimizer accepts
pub const MAX_BATCH_SIZE: usize = 16;

const EPSILON: f64 = 1e-9;

/// One optimal-assignment instance
#[derive(Debug, Clone, Default)]
pub struct BatchProblem {
    /// Minutes of work already ahead at each pile
    pub pile_waits: Vec<f64>,
    /// Free queue slots at each pile
    pub capacities: Vec<usize>,
    /// `charging_minutes[request][pile]`; `None` where the pile cannot serve the request
    pub charging_minutes: Vec<Vec<Option<f64>>>,
}

impl BatchProblem {
    pub fn request_count(&self) -> usize {
        self.charging_minutes.len()
    }

    pub fn pile_count(&self) -> usize {
        self.pile_waits.len()
    }

    fn time(&self, request: usize, pile: usize) -> Option<f64> {
        self.charging_minutes[request].get(pile).copied().flatten()
    }

    /// Sum of completion times and makespan for an explicit assignment.
    ///
    /// Returns `None` if the assignment breaks a capacity or compatibility limit.
    pub fn evaluate(&self, assignments: &[Option<usize>]) -> Option<(f64, f64)> {
        let mut total = 0.0;
        let mut makespan: f64 = 0.0;
        for pile in 0..self.pile_count() {
            let mut times = Vec::new();
            for (request, assigned) in assignments.iter().enumerate() {
                if *assigned == Some(pile) {
                    times.push(self.time(request, pile)?);
                }
            }
            if times.len() > self.capacities[pile] {
                return None;
            }
            times.sort_by(f64::total_cmp);
            let mut clock = self.pile_waits[pile];
            for t in times {
                clock += t;
                total += clock;
            }
            makespan = makespan.max(clock);
        }
        Some((total, makespan))
    }
}

/// Solution of a [`BatchProblem`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    /// Pile index per request; `None` for requests left in the holding area
    pub assignments: Vec<Option<usize>>,
    pub total_minutes: f64,
    pub makespan: f64,
}

impl BatchPlan {
    pub fn placed(&self) -> usize {
        self.assignments.iter().filter(|a| a.is_some()).count()
    }

    /// Requests assigned to `pile`, in the order they will be served
    pub fn pile_sequence(&self, problem: &BatchProblem, pile: usize) -> Vec<usize> {
        let mut requests: Vec<usize> = (0..self.assignments.len())
            .filter(|&r| self.assignments[r] == Some(pile))
            .collect();
        requests.sort_by(|&a, &b| {
            let ta = problem.time(a, pile).unwrap_or(f64::INFINITY);
            let tb = problem.time(b, pile).unwrap_or(f64::INFINITY);
            ta.total_cmp(&tb).then(a.cmp(&b))
        });
        requests
    }
}

/// Cost of serving a subset on one pile in SPT order
#[derive(Debug, Clone, Copy)]
struct SubsetCost {
    total: f64,
    finish: f64,
    work: f64,
    longest: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
struct Score {
    total: f64,
    makespan: f64,
}

impl Score {
    fn better_than(&self, other: &Score) -> bool {
        if self.total < other.total - EPSILON {
            return true;
        }
        (self.total - other.total).abs() <= EPSILON && self.makespan < other.makespan - EPSILON
    }
}

/// Per-subset SPT cost on `pile`; `None` for subsets the pile cannot take
fn subset_costs(problem: &BatchProblem, pile: usize) -> Vec<Option<SubsetCost>> {
    let n = problem.request_count();
    let wait = problem.pile_waits[pile];
    let capacity = problem.capacities[pile];
    let mut costs: Vec<Option<SubsetCost>> = vec![None; 1 << n];
    costs[0] = Some(SubsetCost {
        total: 0.0,
        finish: wait,
        work: 0.0,
        longest: None,
    });

    for mask in 1usize..(1 << n) {
        if mask.count_ones() as usize > capacity {
            continue;
        }
        let low = mask.trailing_zeros() as usize;
        let rest = mask & (mask - 1);
        let (Some(time), Some(rest_cost)) = (problem.time(low, pile), costs[rest]) else {
            continue;
        };

        let longest = match rest_cost.longest {
            Some(l) if problem.time(l, pile).unwrap_or(0.0) >= time => l,
            _ => low,
        };
        let work = rest_cost.work + time;

        // In SPT order the longest request finishes last, at wait + all work.
        let Some(without_longest) = costs[mask ^ (1 << longest)] else {
            continue;
        };
        costs[mask] = Some(SubsetCost {
            total: without_longest.total + wait + work,
            finish: wait + work,
            work,
            longest: Some(longest),
        });
    }
    costs
}

/// Solve a batch assignment problem.
///
/// Returns `None` for an empty batch or one larger than [`MAX_BATCH_SIZE`].
pub fn solve(problem: &BatchProblem) -> Option<BatchPlan> {
    let n = problem.request_count();
    let m = problem.pile_count();
    if n == 0 || n > MAX_BATCH_SIZE {
        return None;
    }
    if m == 0 {
        return Some(BatchPlan {
            assignments: vec![None; n],
            total_minutes: 0.0,
            makespan: 0.0,
        });
    }

    let full = 1usize << n;
    let mut best: Vec<Option<Score>> = vec![None; full];
    best[0] = Some(Score {
        total: 0.0,
        makespan: 0.0,
    });
    let mut choices: Vec<Vec<u32>> = Vec::with_capacity(m);

    for pile in 0..m {
        let costs = subset_costs(problem, pile);
        let mut layer: Vec<Option<Score>> = vec![None; full];
        let mut choice = vec![0u32; full];

        for mask in 0..full {
            let mut sub = mask;
            loop {
                if let (Some(prev), Some(cost)) = (best[mask ^ sub], costs[sub]) {
                    let candidate = Score {
                        total: prev.total + cost.total,
                        makespan: prev.makespan.max(cost.finish),
                    };
                    if layer[mask].is_none_or(|current| candidate.better_than(&current)) {
                        layer[mask] = Some(candidate);
                        choice[mask] = sub as u32;
                    }
                }
                if sub == 0 {
                    break;
                }
                sub = (sub - 1) & mask;
            }
        }

        best = layer;
        choices.push(choice);
    }

    // Most requests placed first, then the better score
    let mut chosen: Option<(usize, Score)> = None;
    for (mask, score) in best.iter().enumerate() {
        let Some(score) = score else { continue };
        let better = match &chosen {
            None => true,
            Some((current, current_score)) => {
                let (placed, current_placed) = (mask.count_ones(), current.count_ones());
                placed > current_placed || (placed == current_placed && score.better_than(current_score))
            }
        };
        if better {
            chosen = Some((mask, *score));
        }
    }
    let (mut mask, score) = chosen?;

    let mut assignments = vec![None; n];
    for pile in (0..m).rev() {
        let sub = choices[pile][mask] as usize;
        for (request, slot) in assignments.iter_mut().enumerate() {
            if sub & (1 << request) != 0 {
                *slot = Some(pile);
            }
        }
        mask ^= sub;
    }

    Some(BatchPlan {
        assignments,
        total_minutes: score.total,
        makespan: score.makespan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator for test instances
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }

        fn below(&mut self, bound: u64) -> u64 {
            self.next() % bound
        }
    }

    fn brute_force_best(problem: &BatchProblem) -> Option<(f64, f64)> {
        fn go(
            problem: &BatchProblem,
            request: usize,
            assignments: &mut Vec<Option<usize>>,
            best: &mut Option<(f64, f64)>,
        ) {
            if request == problem.request_count() {
                if let Some(score) = problem.evaluate(assignments) {
                    let better = match best {
                        None => true,
                        Some(b) => score.0 < b.0 - EPSILON || ((score.0 - b.0).abs() <= EPSILON && score.1 < b.1),
                    };
                    if better {
                        *best = Some(score);
                    }
                }
                return;
            }
            for pile in 0..problem.pile_count() {
                if problem.time(request, pile).is_none() {
                    continue;
                }
                assignments[request] = Some(pile);
                go(problem, request + 1, assignments, best);
            }
            assignments[request] = None;
        }

        let mut best = None;
        let mut assignments = vec![None; problem.request_count()];
        go(problem, 0, &mut assignments, &mut best);
        best
    }

    fn random_problem(rng: &mut Lcg, n: usize, m: usize, compatible_everywhere: bool) -> BatchProblem {
        let powers: Vec<f64> = (0..m).map(|_| if rng.below(2) == 0 { 30.0 } else { 7.0 }).collect();
        let mut capacities: Vec<usize> = (0..m).map(|_| 1 + rng.below(3) as usize).collect();
        while capacities.iter().sum::<usize>() < n {
            let pile = rng.below(m as u64) as usize;
            capacities[pile] += 1;
        }
        let pile_waits = (0..m).map(|_| rng.below(90) as f64).collect();
        let charging_minutes = (0..n)
            .map(|_| {
                let energy = 1.0 + rng.below(40) as f64;
                (0..m)
                    .map(|pile| {
                        if compatible_everywhere || rng.below(4) != 0 {
                            Some(energy * 60.0 / powers[pile])
                        } else {
                            None
                        }
                    })
                    .collect()
            })
            .collect();
        BatchProblem {
            pile_waits,
            capacities,
            charging_minutes,
        }
    }

    #[test]
    fn test_matches_brute_force_for_small_batches() {
        let mut rng = Lcg(42);
        for n in 1..=8 {
            for _ in 0..6 {
                let m = 1 + rng.below(3) as usize;
                let problem = random_problem(&mut rng, n, m, true);
                let plan = solve(&problem).unwrap();
                let (brute_total, brute_makespan) = brute_force_best(&problem).unwrap();

                assert_eq!(plan.placed(), n);
                assert!(
                    (plan.total_minutes - brute_total).abs() < 1e-6,
                    "n={} dp={} brute={}",
                    n,
                    plan.total_minutes,
                    brute_total
                );
                assert!((plan.makespan - brute_makespan).abs() < 1e-6);

                let (total, makespan) = problem.evaluate(&plan.assignments).unwrap();
                assert!((total - plan.total_minutes).abs() < 1e-6);
                assert!((makespan - plan.makespan).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_matches_brute_force_with_incompatible_piles() {
        let mut rng = Lcg(7);
        let mut checked = 0;
        for _ in 0..40 {
            let n = 1 + rng.below(7) as usize;
            let problem = random_problem(&mut rng, n, 3, false);
            let Some((brute_total, _)) = brute_force_best(&problem) else {
                continue;
            };
            let plan = solve(&problem).unwrap();
            assert_eq!(plan.placed(), n);
            assert!((plan.total_minutes - brute_total).abs() < 1e-6);
            checked += 1;
        }
        assert!(checked > 0);
    }

    #[test]
    fn test_spt_order_on_single_pile() {
        let problem = BatchProblem {
            pile_waits: vec![10.0],
            capacities: vec![3],
            charging_minutes: vec![vec![Some(30.0)], vec![Some(10.0)], vec![Some(20.0)]],
        };
        let plan = solve(&problem).unwrap();
        // 10+10, 10+10+20, 10+10+20+30
        assert!((plan.total_minutes - (20.0 + 40.0 + 70.0)).abs() < 1e-9);
        assert_eq!(plan.makespan, 70.0);
        assert_eq!(plan.pile_sequence(&problem, 0), vec![1, 2, 0]);
    }

    #[test]
    fn test_respects_capacity() {
        let problem = BatchProblem {
            pile_waits: vec![0.0, 100.0],
            capacities: vec![1, 2],
            charging_minutes: vec![vec![Some(10.0), Some(10.0)]; 3],
        };
        let plan = solve(&problem).unwrap();
        let on_first = plan.assignments.iter().filter(|a| **a == Some(0)).count();
        assert_eq!(on_first, 1);
        assert_eq!(plan.placed(), 3);
    }

    #[test]
    fn test_partial_placement_when_capacity_short() {
        let problem = BatchProblem {
            pile_waits: vec![0.0],
            capacities: vec![2],
            charging_minutes: vec![vec![Some(30.0)], vec![Some(10.0)], vec![Some(20.0)]],
        };
        let plan = solve(&problem).unwrap();
        assert_eq!(plan.placed(), 2);
        // The two shortest go; the longest waits for the next tick.
        assert_eq!(plan.assignments[0], None);
        assert!((plan.total_minutes - (10.0 + 30.0)).abs() < 1e-9);
    }

    #[test]
    fn test_incompatible_request_left_unplaced() {
        let problem = BatchProblem {
            pile_waits: vec![0.0],
            capacities: vec![2],
            charging_minutes: vec![vec![None], vec![Some(10.0)]],
        };
        let plan = solve(&problem).unwrap();
        assert_eq!(plan.assignments, vec![None, Some(0)]);
    }

    #[test]
    fn test_spreads_work_across_piles() {
        let problem = BatchProblem {
            pile_waits: vec![0.0, 0.0],
            capacities: vec![2, 2],
            charging_minutes: vec![vec![Some(10.0), Some(10.0)], vec![Some(10.0), Some(10.0)]],
        };
        let plan = solve(&problem).unwrap();
        assert_eq!(plan.total_minutes, 20.0);
        assert_eq!(plan.makespan, 10.0);
        assert_ne!(plan.assignments[0], plan.assignments[1]);
    }

    #[test]
    fn test_empty_and_oversized_batches() {
        assert!(solve(&BatchProblem::default()).is_none());

        let problem = BatchProblem {
            pile_waits: vec![0.0],
            capacities: vec![MAX_BATCH_SIZE + 1],
            charging_minutes: vec![vec![Some(1.0)]; MAX_BATCH_SIZE + 1],
        };
        assert!(solve(&problem).is_none());
    }

    #[test]
    fn test_no_piles_places_nothing() {
        let problem = BatchProblem {
            pile_waits: vec![],
            capacities: vec![],
            charging_minutes: vec![vec![], vec![]],
        };
        let plan = solve(&problem).unwrap();
        assert_eq!(plan.placed(), 0);
    }

    #[test]
    fn test_evaluate_rejects_over_capacity() {
        let problem = BatchProblem {
            pile_waits: vec![0.0],
            capacities: vec![1],
            charging_minutes: vec![vec![Some(1.0)], vec![Some(1.0)]],
        };
        assert!(problem.evaluate(&[Some(0), Some(0)]).is_none());
        assert!(problem.evaluate(&[Some(0), None]).is_some());
    }
}
