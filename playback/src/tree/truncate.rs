//! Display truncation that keeps a candidate label visible.

/// Default display budget, in characters.
pub const DEFAULT_TEXT_BUDGET: usize = 40;

const ELLIPSIS: char = '…';

/// Cut `text` to at most `budget` characters.
///
/// When `anchor` occurs in the text the kept window is centered on it, so the
/// anchor survives as long as it fits in `budget - 2` characters. Otherwise the
/// start of the text is kept. Each elided side is marked with a single `…`,
/// which counts against the budget.
pub fn truncate_around(text: &str, anchor: Option<&str>, budget: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    if len <= budget {
        return text.to_string();
    }
    if budget == 0 {
        return String::new();
    }

    let anchor_span = anchor.and_then(|a| {
        let byte_idx = text.find(a)?;
        let start = text[..byte_idx].chars().count();
        Some((start, a.chars().count()))
    });

    let (start, end) = match anchor_span {
        Some((anchor_start, anchor_len)) if budget >= anchor_len + 2 => {
            let inner = budget - 2;
            let center = anchor_start + anchor_len / 2;
            let start = center.saturating_sub(inner / 2);
            if start == 0 {
                (0, budget - 1)
            } else if start + inner >= len {
                (len - (budget - 1), len)
            } else {
                (start, start + inner)
            }
        }
        _ => (0, budget - 1),
    };

    let mut out = String::with_capacity(budget * 4);
    if start > 0 {
        out.push(ELLIPSIS);
    }
    out.extend(&chars[start..end]);
    if end < len {
        out.push(ELLIPSIS);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABEL: &str = "Candidate B";

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_around("Candidate A is fine", Some("Candidate A"), 40), "Candidate A is fine");
    }

    #[test]
    fn test_prefix_kept_without_anchor() {
        let text = "The role requires deep experience with distributed systems at scale";
        let out = truncate_around(text, None, 40);
        assert_eq!(out.chars().count(), 40);
        assert!(out.starts_with("The role requires"));
        assert!(out.ends_with('…'));
    }

    #[test]
    fn test_anchor_in_middle_is_kept() {
        let text = "After weighing the published research record, Candidate B shows the stronger fit for wet lab work overall";
        let out = truncate_around(text, Some(LABEL), 40);
        assert!(out.contains(LABEL), "{out}");
        assert!(out.starts_with('…'));
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 40);
    }

    #[test]
    fn test_anchor_at_end_is_kept() {
        let text = "Looking only at the two years of hands-on pipeline work, the clear choice is Candidate B";
        let out = truncate_around(text, Some(LABEL), 40);
        assert!(out.ends_with(LABEL), "{out}");
        assert!(out.starts_with('…'));
        assert_eq!(out.chars().count(), 40);
    }

    #[test]
    fn test_anchor_at_start_keeps_prefix() {
        let text = "Candidate B has led three production launches and mentored a team of eight engineers";
        let out = truncate_around(text, Some(LABEL), 40);
        assert!(out.starts_with(LABEL));
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().count(), 40);
    }

    #[test]
    fn test_multibyte_text_counts_characters() {
        let text = "Évaluation très détaillée: Candidate B maîtrise parfaitement l'écosystème complet";
        let out = truncate_around(text, Some(LABEL), 40);
        assert!(out.contains(LABEL));
        assert!(out.chars().count() <= 40);
    }
}
