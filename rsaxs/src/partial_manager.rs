//! The incremental histogram manager.
//!
//! Keeps per-body compact coordinates and per-pair partials; change
//! signals raised by the bodies decide which partials are recomputed on
//! the next calculation. A translation of one body invalidates only its
//! cross partials: self partials are translation invariant.

use crate::axis::Axis;
use crate::body::Molecule;
use crate::compact::{self, CompactCoordinates};
use crate::composite::{CompositeDistanceHistogram, HistogramParts};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::histogram::{
    Distribution1D, Distribution2D, Distribution3D, WeightedBins, MIN_BINS,
};
use crate::manager::{check_axis_capacity, HistogramManager};
use crate::pool;
use crate::state::StateManager;
use rayon::prelude::*;

#[derive(Clone, Debug, Default)]
struct PairPartial {
    counts: Distribution3D,
    tracker: WeightedBins,
}

#[derive(Clone, Debug, Default)]
struct WaterCross {
    counts: Distribution2D,
    tracker: WeightedBins,
}

#[derive(Clone, Debug, Default)]
struct WaterSelf {
    counts: Distribution1D,
    tracker: WeightedBins,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Task {
    SelfAa(usize),
    CrossAa(usize, usize),
    Aw(usize),
    Ww,
}

enum TaskResult {
    SelfAa(usize, PairPartial),
    CrossAa(usize, usize, PairPartial),
    Aw(usize, WaterCross),
    Ww(WaterSelf),
}

/// Recomputes only the partials whose bodies changed, guided by the
/// signals collected since the previous calculation.
pub struct PartialManager {
    settings: Settings,
    parallel: bool,
    state: StateManager,
    bins: usize,
    coords: Vec<CompactCoordinates>,
    coords_w: CompactCoordinates,
    // lower triangle: partials_aa[i][j] with j <= i; the diagonal holds
    // the self partials including the bin-0 self terms
    partials_aa: Vec<Vec<PairPartial>>,
    partials_aw: Vec<WaterCross>,
    partial_ww: WaterSelf,
}

impl PartialManager {
    /// A manager tracking the bodies of `molecule`. Binds a change
    /// signaller into every body; the first calculation builds
    /// everything.
    #[must_use]
    pub fn new(settings: Settings, parallel: bool, molecule: &mut Molecule) -> Self {
        let state = StateManager::new(molecule.size());
        for slot in 0..molecule.size() {
            let signaller = state.probe(slot);
            molecule.body_mut(slot).bind_signaller(signaller);
        }
        Self {
            settings,
            parallel,
            state,
            bins: 0,
            coords: Vec::new(),
            coords_w: CompactCoordinates::default(),
            partials_aa: Vec::new(),
            partials_aw: Vec::new(),
            partial_ww: WaterSelf::default(),
        }
    }

    fn weighted(&self) -> bool {
        self.settings.weighted_bins
    }

    fn inv_width(&self) -> f64 {
        1.0 / self.settings.bin_width
    }

    fn allocate(&mut self, bodies: usize, bins: usize) {
        self.bins = bins;
        self.coords = vec![CompactCoordinates::default(); bodies];
        self.partials_aa = (0..bodies)
            .map(|i| {
                (0..=i)
                    .map(|_| PairPartial {
                        counts: Distribution3D::new(crate::form_factor::COUNT_WITHOUT_EXV, bins),
                        tracker: WeightedBins::new(bins),
                    })
                    .collect()
            })
            .collect();
        self.partials_aw = (0..bodies)
            .map(|_| WaterCross {
                counts: Distribution2D::new(crate::form_factor::COUNT_WITHOUT_EXV, bins),
                tracker: WeightedBins::new(bins),
            })
            .collect();
        self.partial_ww = WaterSelf {
            counts: Distribution1D::new(bins),
            tracker: WeightedBins::new(bins),
        };
    }

    fn build_self<const WEIGHTED: bool>(&self, body: usize) -> PairPartial {
        let mut partial = PairPartial {
            counts: Distribution3D::new(crate::form_factor::COUNT_WITHOUT_EXV, self.bins),
            tracker: WeightedBins::new(self.bins),
        };
        let data = &self.coords[body];
        compact::self_terms::<_, WEIGHTED>(&mut partial.counts, &mut partial.tracker, 1.0, data);
        compact::pairs_within::<_, WEIGHTED>(
            &mut partial.counts,
            &mut partial.tracker,
            self.inv_width(),
            1.0,
            data,
            0..data.len(),
        );
        partial
    }

    fn build_cross<const WEIGHTED: bool>(&self, i: usize, j: usize) -> PairPartial {
        let mut partial = PairPartial {
            counts: Distribution3D::new(crate::form_factor::COUNT_WITHOUT_EXV, self.bins),
            tracker: WeightedBins::new(self.bins),
        };
        // both orderings of every inter-body pair
        compact::pairs_between::<_, WEIGHTED>(
            &mut partial.counts,
            &mut partial.tracker,
            self.inv_width(),
            2.0,
            &self.coords[i],
            0..self.coords[i].len(),
            &self.coords[j],
        );
        partial
    }

    fn build_aw<const WEIGHTED: bool>(&self, body: usize) -> WaterCross {
        let mut partial = WaterCross {
            counts: Distribution2D::new(crate::form_factor::COUNT_WITHOUT_EXV, self.bins),
            tracker: WeightedBins::new(self.bins),
        };
        let data = &self.coords[body];
        compact::pairs_between::<_, WEIGHTED>(
            &mut partial.counts,
            &mut partial.tracker,
            self.inv_width(),
            1.0,
            data,
            0..data.len(),
            &self.coords_w,
        );
        partial
    }

    fn build_ww<const WEIGHTED: bool>(&self) -> WaterSelf {
        let mut partial = WaterSelf {
            counts: Distribution1D::new(self.bins),
            tracker: WeightedBins::new(self.bins),
        };
        compact::self_terms::<_, WEIGHTED>(&mut partial.counts, &mut partial.tracker, 1.0, &self.coords_w);
        compact::pairs_within::<_, WEIGHTED>(
            &mut partial.counts,
            &mut partial.tracker,
            self.inv_width(),
            1.0,
            &self.coords_w,
            0..self.coords_w.len(),
        );
        partial
    }

    fn run_task(&self, task: Task) -> TaskResult {
        let weighted = self.weighted();
        match task {
            Task::SelfAa(i) => TaskResult::SelfAa(
                i,
                if weighted {
                    self.build_self::<true>(i)
                } else {
                    self.build_self::<false>(i)
                },
            ),
            Task::CrossAa(i, j) => TaskResult::CrossAa(
                i,
                j,
                if weighted {
                    self.build_cross::<true>(i, j)
                } else {
                    self.build_cross::<false>(i, j)
                },
            ),
            Task::Aw(i) => TaskResult::Aw(
                i,
                if weighted {
                    self.build_aw::<true>(i)
                } else {
                    self.build_aw::<false>(i)
                },
            ),
            Task::Ww => TaskResult::Ww(if weighted {
                self.build_ww::<true>()
            } else {
                self.build_ww::<false>()
            }),
        }
    }

    fn apply(&mut self, result: TaskResult) {
        match result {
            TaskResult::SelfAa(i, partial) => self.partials_aa[i][i] = partial,
            TaskResult::CrossAa(i, j, partial) => self.partials_aa[i][j] = partial,
            TaskResult::Aw(i, partial) => self.partials_aw[i] = partial,
            TaskResult::Ww(partial) => self.partial_ww = partial,
        }
    }

    fn assemble(&self) -> HistogramParts {
        let mut parts = HistogramParts::new(self.bins, self.weighted());
        let mut tracker = WeightedBins::new(self.bins);
        for row in &self.partials_aa {
            for partial in row {
                parts.aa.merge(&partial.counts);
                tracker.merge(&partial.tracker);
            }
        }
        for partial in &self.partials_aw {
            parts.aw.merge(&partial.counts);
            tracker.merge(&partial.tracker);
        }
        parts.ww.merge(&self.partial_ww.counts);
        tracker.merge(&self.partial_ww.tracker);
        if let Some(weighted) = &mut parts.weighted {
            *weighted = tracker;
        }
        parts
    }
}

impl HistogramManager for PartialManager {
    fn calculate_all(&mut self, molecule: &mut Molecule) -> Result<CompositeDistanceHistogram> {
        self.settings.validate()?;
        if molecule.size() != self.state.size() {
            return Err(Error::Config(
                "the molecule changed its body count; attach a fresh manager".into(),
            ));
        }

        // a growing molecule forces a full reallocation; otherwise keep
        // the axis stable so cached partials stay merge-compatible
        let needed = ((molecule.diameter_bound() / self.settings.bin_width).ceil() as usize + 2)
            .max(MIN_BINS);
        check_axis_capacity(&self.settings, needed)?;
        let mut full_rebuild = self.bins == 0;
        if needed > self.bins && self.bins != 0 {
            full_rebuild = true;
        }
        if full_rebuild {
            self.allocate(molecule.size(), needed.max(self.bins));
        }

        let external = self.state.externally_modified();
        let internal = self.state.internally_modified();
        let hydration = self.state.hydration_modified() || full_rebuild;
        let modified: Vec<bool> = external
            .iter()
            .zip(&internal)
            .map(|(&external, &internal)| external || internal || full_rebuild)
            .collect();

        // refresh coordinate caches for every touched body
        for (slot, &modified) in modified.iter().enumerate() {
            if modified {
                self.coords[slot] =
                    CompactCoordinates::from_points(molecule.bodies()[slot].atoms());
            }
        }
        if hydration {
            self.coords_w = CompactCoordinates::waters_from_bodies(molecule.bodies());
        }

        let mut tasks = Vec::new();
        for (slot, &internal) in internal.iter().enumerate() {
            if internal || full_rebuild {
                tasks.push(Task::SelfAa(slot));
            }
        }
        for i in 0..molecule.size() {
            for j in 0..i {
                if modified[i] || modified[j] {
                    tasks.push(Task::CrossAa(i, j));
                }
            }
        }
        for (slot, &modified) in modified.iter().enumerate() {
            if modified || hydration {
                tasks.push(Task::Aw(slot));
            }
        }
        if hydration {
            tasks.push(Task::Ww);
        }

        let this: &Self = self;
        let results: Vec<TaskResult> = if this.parallel {
            pool::initialize(this.settings.threads);
            pool::pool().install(|| tasks.par_iter().map(|&task| this.run_task(task)).collect())
        } else {
            tasks.iter().map(|&task| this.run_task(task)).collect()
        };
        for result in results {
            self.apply(result);
        }
        self.state.reset();

        let d_axis = Axis::from_width(self.settings.bin_width, self.bins);
        Ok(CompositeDistanceHistogram::new(
            self.assemble(),
            &d_axis,
            self.settings.q_values(),
        ))
    }

    fn state_manager(&self) -> Option<&StateManager> {
        Some(&self.state)
    }
}
