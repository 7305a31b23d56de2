// ============================================================================
// STRIPE SCHEDULER: fork-join row partitioning over a per-call worker pool
// ============================================================================
//
// The image is cut into N horizontal stripes (N = worker count, clamped to the
// image height). Each stripe gets exclusive write access to its own rows of
// the destination. Filters that read neighbours go through `run_with_halo`,
// which hands each task a read-only window of the source extended by `halo`
// rows above and below, so parallel output matches a single-threaded run.
//
// The pool is built for one invocation and dropped before returning: no
// operation ever returns while stripe tasks are still running.

use std::ops::Range;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};

use crate::buffer::{CHANNELS, PixelBuffer};
use crate::error::{EngineError, Result};

/// One contiguous row range `[y_start, y_end)` owned by a single task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stripe {
    pub index: usize,
    pub y_start: u32,
    pub y_end: u32,
}

impl Stripe {
    pub fn rows(&self) -> Range<u32> {
        self.y_start..self.y_end
    }

    pub fn len(&self) -> u32 {
        self.y_end - self.y_start
    }

    pub fn is_empty(&self) -> bool {
        self.y_start == self.y_end
    }
}

/// Split `height` rows into `n` nearly-equal bands; the last band absorbs
/// the remainder. `n` is clamped to `[1, height]` so no stripe is empty.
pub fn stripes(height: u32, n: usize) -> Vec<Stripe> {
    let n = n.clamp(1, height.max(1) as usize) as u32;
    let band = height / n;
    (0..n)
        .map(|i| Stripe {
            index: i as usize,
            y_start: i * band,
            y_end: if i + 1 == n { height } else { (i + 1) * band },
        })
        .collect()
}

/// Read-only view of the source restricted to a stripe plus its halo.
///
/// Reads outside the window are a scheduling bug, not an image border: the
/// filter asked for more context than it declared.
pub struct HaloView<'a> {
    src: &'a PixelBuffer,
    window: Range<u32>,
}

impl<'a> HaloView<'a> {
    pub fn width(&self) -> u32 {
        self.src.width()
    }

    /// Full image height, for border tests.
    pub fn height(&self) -> u32 {
        self.src.height()
    }

    pub fn window(&self) -> Range<u32> {
        self.window.clone()
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> [f32; 4] {
        debug_assert!(
            self.window.contains(&y),
            "row {y} outside halo window {:?}",
            self.window
        );
        self.src.get(x, y)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Scheduler {
    workers: usize,
    join_timeout: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(0, Duration::from_secs(600))
    }
}

impl Scheduler {
    /// `workers == 0` sizes the pool from the available hardware parallelism.
    pub fn new(workers: usize, join_timeout: Duration) -> Self {
        Self { workers, join_timeout }
    }

    /// Single worker, used as the reference for parity checks.
    pub fn serial() -> Self {
        Self::new(1, Duration::from_secs(600))
    }

    pub fn workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Run `f` once per stripe of `dst`. Each call receives the stripe and
    /// the stripe's rows of `dst` as one interleaved slice.
    pub fn run<F>(&self, dst: &mut PixelBuffer, f: F) -> Result<()>
    where
        F: Fn(&Stripe, &mut [f32]) + Sync,
    {
        let height = dst.height();
        let stride = dst.stride();
        let plan = stripes(height, self.workers());
        self.fork_join(dst.as_raw_mut(), stride, &plan, |stripe, rows| f(stripe, rows))
    }

    /// Like [`Scheduler::run`] but each task also gets a [`HaloView`] of `src`
    /// covering its rows plus `halo` rows on either side.
    pub fn run_with_halo<F>(&self, src: &PixelBuffer, dst: &mut PixelBuffer, halo: u32, f: F) -> Result<()>
    where
        F: Fn(&Stripe, &HaloView<'_>, &mut [f32]) + Sync,
    {
        if !src.same_dimensions(dst) {
            return Err(EngineError::mismatch(src.dimensions(), dst.dimensions()));
        }
        let height = src.height();
        let stride = dst.stride();
        let plan = stripes(height, self.workers());
        self.fork_join(dst.as_raw_mut(), stride, &plan, |stripe, rows| {
            let view = HaloView {
                src,
                window: stripe.y_start.saturating_sub(halo)..(stripe.y_end + halo).min(height),
            };
            f(stripe, &view, rows)
        })
    }

    fn fork_join<F>(&self, data: &mut [f32], stride: usize, plan: &[Stripe], task: F) -> Result<()>
    where
        F: Fn(&Stripe, &mut [f32]) + Sync,
    {
        let started = Instant::now();

        // Carve the destination into disjoint row slices, one per stripe.
        let mut slices = Vec::with_capacity(plan.len());
        let mut rest = data;
        for stripe in plan {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(stripe.len() as usize * stride);
            slices.push((*stripe, head));
            rest = tail;
        }

        if plan.len() == 1 {
            let (stripe, rows) = slices.pop().ok_or_else(|| EngineError::Internal("empty stripe plan".into()))?;
            catch_unwind(AssertUnwindSafe(|| task(&stripe, rows)))
                .map_err(|_| EngineError::Internal("stripe task panicked".into()))?;
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(plan.len())
                .thread_name(|i| format!("stripe-{i}"))
                .build()
                .map_err(|e| EngineError::Internal(format!("worker pool: {e}")))?;

            let task = &task;
            catch_unwind(AssertUnwindSafe(|| {
                pool.scope(|scope| {
                    for (stripe, rows) in slices {
                        scope.spawn(move |_| task(&stripe, rows));
                    }
                })
            }))
            .map_err(|_| EngineError::Internal("stripe task panicked".into()))?;
            // Pool dropped here; all workers have already joined the scope.
        }

        let elapsed = started.elapsed();
        tracing::trace!(stripes = plan.len(), ?elapsed, "stripe join complete");
        if elapsed > self.join_timeout {
            tracing::error!(?elapsed, timeout = ?self.join_timeout, "stripe join exceeded timeout");
            return Err(EngineError::Internal(format!(
                "stripe join took {:.1}s (limit {:.1}s)",
                elapsed.as_secs_f64(),
                self.join_timeout.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Row `y` (absolute) inside a stripe's slice.
#[inline]
pub fn stripe_row<'a>(rows: &'a mut [f32], stripe: &Stripe, y: u32, width: u32) -> &'a mut [f32] {
    let stride = width as usize * CHANNELS;
    let local = (y - stripe.y_start) as usize;
    &mut rows[local * stride..(local + 1) * stride]
}
