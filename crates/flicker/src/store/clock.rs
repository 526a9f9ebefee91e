use std::time::Duration;

/// Largest elapsed time a single tick may add. Long stalls (a backgrounded
/// window, a debugger pause) must not fast-forward through many frames.
pub const DEFAULT_MAX_TIME_STEP: Duration = Duration::from_secs(1);

/// Result of one pacing evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Keep showing the current frame.
    Hold,
    /// The displayed frame changed; the caller owes a preload for `current`.
    Advanced(FrameChange),
}

impl Tick {
    pub fn advanced(self) -> bool {
        matches!(self, Tick::Advanced(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameChange {
    pub previous: usize,
    pub current: usize,
    /// The index wrapped to 0 and a loop was counted.
    pub wrapped: bool,
    /// This advance reached the last frame of the last loop.
    pub finished: bool,
}

/// Frame pacing and loop accounting for one animation.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    frame_count: usize,
    /// Target loops; `<= 0` loops forever.
    loop_count: i32,
    max_time_step: Duration,
    current_frame_index: usize,
    previous_frame_index: usize,
    current_loop: usize,
    is_finished: bool,
    time_since_last_frame_change: Duration,
}

impl PlaybackClock {
    pub fn new(frame_count: usize, loop_count: i32, max_time_step: Duration) -> Self {
        Self {
            frame_count,
            loop_count,
            max_time_step,
            current_frame_index: 0,
            previous_frame_index: 0,
            current_loop: 0,
            is_finished: false,
            time_since_last_frame_change: Duration::ZERO,
        }
    }

    pub fn current_frame_index(&self) -> usize {
        self.current_frame_index
    }

    pub fn previous_frame_index(&self) -> usize {
        self.previous_frame_index
    }

    pub fn current_loop(&self) -> usize {
        self.current_loop
    }

    pub fn is_finished(&self) -> bool {
        self.is_finished
    }

    pub fn time_since_last_frame_change(&self) -> Duration {
        self.time_since_last_frame_change
    }

    /// Single-frame (or empty) animations never advance.
    pub fn is_animatable(&self) -> bool {
        self.frame_count > 1
    }

    /// Add `elapsed` (capped at `max_time_step`) and advance at most one frame
    /// once the current frame's duration has been consumed.
    pub fn tick(&mut self, elapsed: Duration, duration_of: impl Fn(usize) -> Duration) -> Tick {
        if !self.is_animatable() {
            return Tick::Hold;
        }

        self.time_since_last_frame_change = self
            .time_since_last_frame_change
            .saturating_add(elapsed.min(self.max_time_step));

        let current_duration = duration_of(self.current_frame_index);
        if current_duration > self.time_since_last_frame_change {
            return Tick::Hold;
        }

        self.time_since_last_frame_change -= current_duration;
        Tick::Advanced(self.advance())
    }

    fn advance(&mut self) -> FrameChange {
        let previous = self.current_frame_index;
        self.current_frame_index = (previous + 1) % self.frame_count;
        self.previous_frame_index = previous;

        let mut change = FrameChange {
            previous,
            current: self.current_frame_index,
            wrapped: false,
            finished: false,
        };

        if self.is_last_loop() && self.is_last_frame() {
            change.finished = !self.is_finished;
            self.is_finished = true;
        } else if self.current_frame_index == 0 {
            self.current_loop += 1;
            change.wrapped = true;
        }
        change
    }

    fn is_last_frame(&self) -> bool {
        self.current_frame_index == self.frame_count - 1
    }

    /// Always false for infinite playback.
    fn is_last_loop(&self) -> bool {
        self.loop_count > 0 && self.current_loop == (self.loop_count - 1) as usize
    }
}
