use chrono::{DateTime, Duration, Utc};

use super::{SongMode, SongProgress};
use crate::types::CardState;

/// XP for a finished song lesson: the mode's base plus accuracy bonuses.
pub fn song_xp(
    mode: SongMode,
    vocab_correct: i64,
    vocab_total: i64,
    blanks_correct: i64,
    blanks_total: i64,
) -> i64 {
    let mut xp = mode.base_xp();
    if vocab_total > 0 {
        xp += (vocab_correct as f64 / vocab_total as f64 * 10.0).floor() as i64;
    }
    if blanks_total > 0 {
        xp += (blanks_correct as f64 / blanks_total as f64 * 15.0).floor() as i64;
    }
    xp
}

/// Song-level memory update after a finished lesson.
///
/// `accuracy` is a fraction in [0, 1]. The next review lands between 1 and
/// 30 days out depending on the new stability.
pub fn apply_song_result(
    progress: &SongProgress,
    mode: SongMode,
    accuracy: f64,
    now: DateTime<Utc>,
) -> SongProgress {
    let mut next = progress.clone();

    match mode {
        SongMode::Vocab => next.vocab_complete = true,
        SongMode::Lyrics => next.lyrics_complete = true,
        SongMode::Listening => next.listening_complete = true,
        SongMode::Full => {
            next.vocab_complete = true;
            next.lyrics_complete = true;
            next.listening_complete = true;
        }
    }

    if accuracy >= 0.8 {
        next.stability = progress.stability * 1.5 + 1.0;
        next.state = CardState::Review;
    } else if accuracy >= 0.6 {
        next.stability = progress.stability * 1.2 + 0.5;
        next.state = CardState::Learning;
    } else {
        next.stability = progress.stability * 0.8;
        next.lapses += 1;
        next.state = CardState::Relearning;
    }

    next.reps += 1;
    next.last_review = Some(now);
    let days = (next.stability.floor() as i64).clamp(1, 30);
    next.due = Some(now + Duration::days(days));
    next
}

/// Closing line for a song lesson by integer accuracy percent.
pub fn completion_message(accuracy: i64) -> &'static str {
    match accuracy {
        90.. => "Amazing! You really know this song!",
        80..=89 => "Great listening skills!",
        70..=79 => "Good job! Keep practicing!",
        60..=69 => "Nice effort! Listen again to catch more.",
        _ => "Keep listening! You'll get better with practice.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap()
    }

    fn progress(stability: f64) -> SongProgress {
        SongProgress {
            stability,
            reps: 2,
            state: CardState::Review,
            ..SongProgress::new(1, 7)
        }
    }

    #[test]
    fn song_xp_adds_floored_bonuses() {
        assert_eq!(song_xp(SongMode::Full, 0, 0, 0, 0), 30);
        assert_eq!(song_xp(SongMode::Full, 3, 3, 8, 8), 55);
        assert_eq!(song_xp(SongMode::Vocab, 2, 3, 0, 0), 16);
        assert_eq!(song_xp(SongMode::Listening, 0, 0, 5, 8), 29);
    }

    #[test]
    fn strong_result_grows_stability() {
        let next = apply_song_result(&progress(4.0), SongMode::Full, 0.9, now());
        assert_eq!(next.stability, 7.0);
        assert_eq!(next.state, CardState::Review);
        assert_eq!(next.reps, 3);
        assert_eq!(next.lapses, 0);
        assert_eq!(next.last_review, Some(now()));
        assert_eq!(next.due, Some(now() + Duration::days(7)));
        assert!(next.vocab_complete && next.lyrics_complete && next.listening_complete);
    }

    #[test]
    fn middling_result_moves_to_learning() {
        let next = apply_song_result(&progress(5.0), SongMode::Lyrics, 0.7, now());
        assert_eq!(next.stability, 6.5);
        assert_eq!(next.state, CardState::Learning);
        assert_eq!(next.due, Some(now() + Duration::days(6)));
        assert!(next.lyrics_complete);
        assert!(!next.vocab_complete);
    }

    #[test]
    fn weak_result_counts_a_lapse() {
        let next = apply_song_result(&progress(10.0), SongMode::Listening, 0.4, now());
        assert_eq!(next.stability, 8.0);
        assert_eq!(next.lapses, 1);
        assert_eq!(next.state, CardState::Relearning);
        assert!(next.listening_complete);
    }

    #[test]
    fn due_is_clamped_between_one_and_thirty_days() {
        let fresh = apply_song_result(&SongProgress::new(1, 7), SongMode::Vocab, 0.0, now());
        assert_eq!(fresh.due, Some(now() + Duration::days(1)));

        let strong = apply_song_result(&progress(80.0), SongMode::Full, 1.0, now());
        assert_eq!(strong.due, Some(now() + Duration::days(30)));
    }

    #[test]
    fn completion_messages_by_accuracy() {
        assert_eq!(completion_message(95), "Amazing! You really know this song!");
        assert_eq!(completion_message(80), "Great listening skills!");
        assert_eq!(completion_message(79), "Good job! Keep practicing!");
        assert_eq!(completion_message(60), "Nice effort! Listen again to catch more.");
        assert_eq!(completion_message(10), "Keep listening! You'll get better with practice.");
    }
}
