//! Performance samples derived from GPU timestamp queries.
//!
//! The graphics command buffer writes 14 timestamps: a begin/end pair per render pass
//! (queries 0..12) and a pair around the whole buffer (12/13). The compute buffers write
//! a pair per integrator step (0/1 and 2/3).

use crate::uniforms::PerformanceMeterUniforms;

/// Timestamp queries in the graphics pool.
pub const GRAPHICS_QUERY_COUNT: u32 = 14;
/// Timestamp queries in the compute pool.
pub const COMPUTE_QUERY_COUNT: u32 = 4;
/// Queries bracketing the whole graphics command buffer.
pub const GRAPHICS_FRAME_QUERIES: (u32, u32) = (12, 13);
/// Queries bracketing integrator step one.
pub const COMPUTE_STEP_ONE_QUERIES: (u32, u32) = (0, 1);
/// Queries bracketing integrator step two and the buffer copy.
pub const COMPUTE_STEP_TWO_QUERIES: (u32, u32) = (2, 3);

/// Render passes in recording order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GraphicsStage {
    Scene,
    Luminance,
    BlurHorizontal,
    BlurVertical,
    Combine,
    ToneMap,
}

impl GraphicsStage {
    /// All passes in recording order.
    pub const ALL: [Self; 6] = [
        Self::Scene,
        Self::Luminance,
        Self::BlurHorizontal,
        Self::BlurVertical,
        Self::Combine,
        Self::ToneMap,
    ];

    /// Position in the recording order.
    pub const fn ordinal(self) -> usize {
        match self {
            Self::Scene => 0,
            Self::Luminance => 1,
            Self::BlurHorizontal => 2,
            Self::BlurVertical => 3,
            Self::Combine => 4,
            Self::ToneMap => 5,
        }
    }

    /// Begin and end query of this pass.
    pub const fn queries(self) -> (u32, u32) {
        let begin = self.ordinal() as u32 * 2;
        (begin, begin + 1)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Luminance => "luminance",
            Self::BlurHorizontal => "blur horizontal",
            Self::BlurVertical => "blur vertical",
            Self::Combine => "combine",
            Self::ToneMap => "tone map",
        }
    }
}

/// What a sample measures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleStage {
    Graphics(GraphicsStage),
    /// Graphics time outside any pass
    GraphicsOverhead,
    IntegrateStepOne,
    IntegrateStepTwo,
}

impl SampleStage {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Graphics(stage) => stage.name(),
            Self::GraphicsOverhead => "graphics overhead",
            Self::IntegrateStepOne => "integrate step one",
            Self::IntegrateStepTwo => "integrate step two",
        }
    }
}

/// Timed duration of one pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PerformanceSample {
    pub stage: SampleStage,
    pub duration_ms: f64,
    /// Share of the owning queue's total
    pub share: f32,
}

fn elapsed_ns(timestamps: &[u64], (begin, end): (u32, u32), period_ns: f64) -> f64 {
    let begin = timestamps[begin as usize];
    let end = timestamps[end as usize];
    end.wrapping_sub(begin) as f64 * period_ns
}

fn share(part: f64, total: f64) -> f32 {
    if total > 0.0 {
        (part / total) as f32
    } else {
        0.0
    }
}

/// Per-pass graphics durations in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GraphicsTimings {
    pub stages: [f64; 6],
    pub total: f64,
}

impl GraphicsTimings {
    /// Build from the 14 raw timestamps of one frame; `period_ns` is the device tick length.
    pub fn from_timestamps(timestamps: &[u64], period_ns: f64) -> Option<Self> {
        if timestamps.len() < GRAPHICS_QUERY_COUNT as usize {
            return None;
        }
        let mut stages = [0.0; 6];
        for stage in GraphicsStage::ALL {
            stages[stage.ordinal()] = elapsed_ns(timestamps, stage.queries(), period_ns);
        }
        let total = elapsed_ns(timestamps, GRAPHICS_FRAME_QUERIES, period_ns);
        Some(Self { stages, total })
    }

    /// Time not covered by any pass.
    pub fn overhead(&self) -> f64 {
        (self.total - self.stages.iter().sum::<f64>()).max(0.0)
    }

    /// Meter bar with one segment per pass plus overhead.
    pub fn meter(&self) -> PerformanceMeterUniforms {
        let mut meter = PerformanceMeterUniforms {
            process_count: 7,
            ..Default::default()
        };
        for (slot, stage) in meter.positions.iter_mut().zip(self.stages) {
            *slot = share(stage, self.total);
        }
        meter.positions[6] = share(self.overhead(), self.total);
        meter
    }

    pub fn samples(&self) -> Vec<PerformanceSample> {
        let mut samples: Vec<_> = GraphicsStage::ALL
            .iter()
            .map(|&stage| PerformanceSample {
                stage: SampleStage::Graphics(stage),
                duration_ms: self.stages[stage.ordinal()] / 1.0e6,
                share: share(self.stages[stage.ordinal()], self.total),
            })
            .collect();
        samples.push(PerformanceSample {
            stage: SampleStage::GraphicsOverhead,
            duration_ms: self.overhead() / 1.0e6,
            share: share(self.overhead(), self.total),
        });
        samples
    }
}

/// Integrator durations in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ComputeTimings {
    pub step_one: f64,
    pub step_two: f64,
}

impl ComputeTimings {
    /// Duration of step one from queries 0/1.
    pub fn step_one_from(timestamps: &[u64], period_ns: f64) -> Option<f64> {
        (timestamps.len() >= 2).then(|| elapsed_ns(timestamps, (0, 1), period_ns))
    }

    /// Duration of step two from a slice holding queries 2/3 at positions 0/1.
    pub fn step_two_from(timestamps: &[u64], period_ns: f64) -> Option<f64> {
        (timestamps.len() >= 2).then(|| elapsed_ns(timestamps, (0, 1), period_ns))
    }

    pub fn total(&self) -> f64 {
        self.step_one + self.step_two
    }

    /// Meter bar with one segment per step.
    pub fn meter(&self) -> PerformanceMeterUniforms {
        let total = self.total();
        let mut meter = PerformanceMeterUniforms {
            process_count: 2,
            ..Default::default()
        };
        meter.positions[0] = share(self.step_one, total);
        meter.positions[1] = share(self.step_two, total);
        meter
    }

    pub fn samples(&self) -> [PerformanceSample; 2] {
        let total = self.total();
        [
            PerformanceSample {
                stage: SampleStage::IntegrateStepOne,
                duration_ms: self.step_one / 1.0e6,
                share: share(self.step_one, total),
            },
            PerformanceSample {
                stage: SampleStage::IntegrateStepTwo,
                duration_ms: self.step_two / 1.0e6,
                share: share(self.step_two, total),
            },
        ]
    }
}

/// Every graphics pass, the graphics overhead and both integrator steps.
pub fn stage_samples(
    graphics: &GraphicsTimings,
    compute: &ComputeTimings,
) -> Vec<PerformanceSample> {
    let mut samples = graphics.samples();
    samples.extend(compute.samples());
    samples
}

/// Bar lengths of the (compute, graphics) meters: the slower queue gets the full bar.
pub fn relative_sizes(compute_total: f64, graphics_total: f64) -> (f32, f32) {
    if compute_total > graphics_total {
        (1.0, share(graphics_total, compute_total))
    } else {
        (share(compute_total, graphics_total), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame_timestamps() -> Vec<u64> {
        // each pass takes (i + 1) * 100 ticks, frame spans 3000 ticks
        let mut ts = vec![0u64; 14];
        let mut t = 1000;
        for stage in GraphicsStage::ALL {
            let (b, e) = stage.queries();
            ts[b as usize] = t;
            t += (stage.ordinal() as u64 + 1) * 100;
            ts[e as usize] = t;
        }
        ts[12] = 900;
        ts[13] = 3900;
        ts
    }

    #[test]
    fn pass_queries_are_paired() {
        assert_eq!(GraphicsStage::Scene.queries(), (0, 1));
        assert_eq!(GraphicsStage::ToneMap.queries(), (10, 11));
    }

    #[test]
    fn graphics_timings_from_ticks() {
        let timings = GraphicsTimings::from_timestamps(&frame_timestamps(), 2.0).unwrap();
        assert_relative_eq!(timings.stages[0], 200.0);
        assert_relative_eq!(timings.stages[5], 1200.0);
        assert_relative_eq!(timings.total, 6000.0);
        assert_relative_eq!(timings.overhead(), 6000.0 - 4200.0);
    }

    #[test]
    fn graphics_meter_shares_sum_to_one() {
        let timings = GraphicsTimings::from_timestamps(&frame_timestamps(), 1.0).unwrap();
        let meter = timings.meter();
        assert_eq!(meter.process_count, 7);
        let sum: f32 = meter.positions[..7].iter().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-5);
        assert_eq!(timings.samples().len(), 7);
    }

    #[test]
    fn short_readback_is_rejected() {
        assert!(GraphicsTimings::from_timestamps(&[0; 4], 1.0).is_none());
        assert!(ComputeTimings::step_one_from(&[1], 1.0).is_none());
    }

    #[test]
    fn zero_total_does_not_divide() {
        let timings = GraphicsTimings::default();
        assert_eq!(timings.meter().positions, [0.0; 8]);
        assert_eq!(ComputeTimings::default().meter().positions[0], 0.0);
    }

    #[test]
    fn compute_meter() {
        let timings = ComputeTimings {
            step_one: 300.0,
            step_two: 100.0,
        };
        let meter = timings.meter();
        assert_eq!(meter.process_count, 2);
        assert_relative_eq!(meter.positions[0], 0.75);
        assert_relative_eq!(meter.positions[1], 0.25);
        assert_relative_eq!(timings.samples()[1].duration_ms, 1.0e-4);
    }

    #[test]
    fn slower_queue_gets_full_bar() {
        assert_eq!(relative_sizes(2.0, 1.0), (1.0, 0.5));
        assert_eq!(relative_sizes(1.0, 4.0), (0.25, 1.0));
        assert_eq!(relative_sizes(0.0, 0.0), (0.0, 1.0));
    }

    #[test]
    fn stage_samples_cover_both_queues() {
        let graphics = GraphicsTimings::from_timestamps(&frame_timestamps(), 1.0).unwrap();
        let compute = ComputeTimings {
            step_one: 3.0e6,
            step_two: 1.0e6,
        };
        let samples = stage_samples(&graphics, &compute);
        assert_eq!(samples.len(), GraphicsStage::ALL.len() + 3);

        let names: std::collections::HashSet<_> =
            samples.iter().map(|sample| sample.stage.name()).collect();
        assert_eq!(names.len(), samples.len());

        let (graphics_share, compute_share) =
            samples.iter().fold((0.0, 0.0), |(g, c), sample| match sample.stage {
                SampleStage::IntegrateStepOne | SampleStage::IntegrateStepTwo => {
                    (g, c + sample.share)
                }
                _ => (g + sample.share, c),
            });
        assert_relative_eq!(graphics_share, 1.0, epsilon = 1e-5);
        assert_relative_eq!(compute_share, 1.0, epsilon = 1e-5);

        let step_one = samples
            .iter()
            .find(|sample| sample.stage == SampleStage::IntegrateStepOne)
            .unwrap();
        assert_relative_eq!(step_one.duration_ms, 3.0);
        assert_relative_eq!(step_one.share, 0.75);
    }
}
