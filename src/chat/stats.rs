//! Per-turn and per-session chat statistics.

use serde::Serialize;

/// Statistics for a single chat turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatStats {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,

    /// Wall-clock time for the turn in milliseconds.
    pub time_taken_ms: u64,

    /// Completion throughput, rounded to two decimals.
    pub tokens_per_second: f64,
}

impl ChatStats {
    pub fn new(prompt_tokens: u32, completion_tokens: u32, time_taken_ms: u64) -> Self {
        // Zero elapsed time pins throughput to 0.0 instead of dividing by zero.
        let tokens_per_second = if time_taken_ms == 0 {
            0.0
        } else {
            round2(completion_tokens as f64 / (time_taken_ms as f64 / 1000.0))
        };
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            time_taken_ms,
            tokens_per_second,
        }
    }
}

/// Running aggregate over the chat turns of a session. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionStats {
    pub total_messages: u64,
    pub total_tokens: u64,
    pub total_time_ms: u64,

    /// Average throughput across the whole session, rounded to two decimals.
    pub average_tokens_per_second: f64,
}

impl SessionStats {
    /// Fold one turn into the running sums and recompute the average.
    pub fn record_turn(&mut self, stats: &ChatStats) {
        self.total_messages += 1;
        self.total_tokens += u64::from(stats.total_tokens);
        self.total_time_ms += stats.time_taken_ms;
        self.average_tokens_per_second = if self.total_time_ms == 0 {
            0.0
        } else {
            round2(self.total_tokens as f64 / (self.total_time_ms as f64 / 1000.0))
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_per_second() {
        let stats = ChatStats::new(5, 10, 2000);
        assert_eq!(stats.tokens_per_second, 5.0);
        assert_eq!(stats.total_tokens, 15);
    }

    #[test]
    fn test_zero_elapsed_time_pins_throughput() {
        let stats = ChatStats::new(2, 7, 0);
        assert_eq!(stats.tokens_per_second, 0.0);
        assert_eq!(stats.total_tokens, 9);
    }

    #[test]
    fn test_throughput_rounded_to_two_decimals() {
        // 10 tokens / 3 s = 3.333... → 3.33
        let stats = ChatStats::new(0, 10, 3000);
        assert_eq!(stats.tokens_per_second, 3.33);
    }

    #[test]
    fn test_session_stats_accumulate() {
        let mut session = SessionStats::default();
        session.record_turn(&ChatStats::new(2, 8, 1000));
        session.record_turn(&ChatStats::new(4, 6, 1000));

        assert_eq!(session.total_messages, 2);
        assert_eq!(session.total_tokens, 20);
        assert_eq!(session.total_time_ms, 2000);
        assert_eq!(session.average_tokens_per_second, 10.0);
    }

    #[test]
    fn test_session_stats_reset() {
        let mut session = SessionStats::default();
        session.record_turn(&ChatStats::new(1, 1, 10));
        session.reset();
        assert_eq!(session, SessionStats::default());
    }
}
