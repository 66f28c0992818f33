//! Free-text drug mention extraction.
//!
//! Text is split into sentence-like segments. Within a segment the extractor locates dose,
//! frequency and route spans, then drug names: catalog phrases of one to three words, plus the
//! word directly in front of a dose when it is not a stop word. Attributes attach to the nearest
//! preceding name in the segment, or to the first name when they precede every name. An
//! attribute is carried forward to the next name instead when it is joined to it by "of"
//! ("325mg of aspirin") or when the preceding name already holds that kind of attribute.
//!
//! Extraction never fails. Unrecognisable text simply yields fewer mentions.

use crate::catalog::{parse_dose, Catalog};
use crate::constants::MAX_NAME_WORDS;
use api_shared::DrugMention;
use regex::Regex;
use rx_types::Route;
use std::ops::Range;
use std::sync::LazyLock;

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z][A-Za-z0-9'\-]*").expect("valid regex"));

static DOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+(?:\.\d+)?)\s*([A-Za-zµμ]+\b|%)").expect("valid regex")
});

// Alternatives are tried leftmost-first, so longer phrases come before their prefixes.
// Dotted abbreviations stop before their final `.`; see `extend_abbreviation`.
static FREQUENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:once|twice|three times|four times)\s+(?:daily|a day|per day|weekly|a week)|every\s+\d+\s+hours?|every\s+(?:morning|night|evening|day|other day)|q\d+h|at\s+bedtime|as\s+needed|daily|nightly|weekly|b\.i\.d|t\.i\.d|q\.i\.d|p\.r\.n|q\.d|o\.d|b\.d|bid|tid|qid|qds|tds|bd|od|qd|prn)\b",
    )
    .expect("valid regex")
});

static ROUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:by\s+mouth|under\s+the\s+tongue|orally|oral|p\.o|po|intravenously|intravenous|i\.v|iv|intramuscularly|intramuscular|i\.m|im|topically|topical|sublingually|sublingual)\b",
    )
    .expect("valid regex")
});

const STOP_WORDS: &[&str] = &[
    "a", "also", "an", "and", "at", "be", "by", "continue", "daily", "dose", "for", "give",
    "given", "has", "he", "her", "his", "in", "is", "of", "on", "or", "patient", "plus",
    "prescribed", "she", "start", "started", "take", "taken", "takes", "taking", "the", "then",
    "to", "was", "with",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AttrKind {
    Dose,
    Frequency,
    Route,
}

#[derive(Clone, Debug)]
struct Attr {
    span: Range<usize>,
    kind: AttrKind,
    value: String,
}

#[derive(Clone, Debug)]
struct NameSpan {
    span: Range<usize>,
    text: String,
}

/// Extract drug mentions from free text, deduplicated by full equality in document order.
pub fn extract(catalog: &Catalog, text: &str) -> Vec<DrugMention> {
    let mut mentions: Vec<DrugMention> = Vec::new();

    for segment in segments(text) {
        for mention in extract_segment(catalog, segment) {
            if !mentions.contains(&mention) {
                mentions.push(mention);
            }
        }
    }

    mentions
}

/// Split on sentence punctuation and newlines.
///
/// A `.` between two digits is a decimal point, and a `.` after a single letter belongs to a
/// dotted abbreviation such as `p.o.` or `b.i.d.`; neither splits.
fn segments(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut out = Vec::new();
    let mut start = 0;

    for (i, &(pos, c)) in chars.iter().enumerate() {
        let split = match c {
            '\n' | '\r' | ';' | '!' | '?' => true,
            '.' => {
                let prev_digit = i > 0 && chars[i - 1].1.is_ascii_digit();
                let next_digit = chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit());
                !(prev_digit && next_digit) && !after_single_letter(&chars, i)
            }
            _ => false,
        };
        if split {
            out.push(&text[start..pos]);
            start = pos + c.len_utf8();
        }
    }
    out.push(&text[start..]);

    out.into_iter().filter(|s| !s.trim().is_empty()).collect()
}

fn after_single_letter(chars: &[(usize, char)], dot: usize) -> bool {
    if dot == 0 || !chars[dot - 1].1.is_ascii_alphabetic() {
        return false;
    }
    dot < 2 || !chars[dot - 2].1.is_alphanumeric()
}

/// Include the closing `.` of a dotted abbreviation match.
fn extend_abbreviation(segment: &str, span: Range<usize>) -> Range<usize> {
    let dotted = segment[span.clone()].contains('.');
    if dotted && segment[span.end..].starts_with('.') {
        span.start..span.end + 1
    } else {
        span
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn attributes(catalog: &Catalog, segment: &str) -> Vec<Attr> {
    let mut attrs = Vec::new();

    for caps in DOSE_RE.captures_iter(segment) {
        let (Some(whole), Some(unit)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        if !catalog.is_unit(unit.as_str()) {
            continue;
        }
        if let Some(parsed) = parse_dose(whole.as_str()) {
            attrs.push(Attr {
                span: whole.range(),
                kind: AttrKind::Dose,
                value: parsed.compact(),
            });
        }
    }

    for m in FREQUENCY_RE.find_iter(segment) {
        let span = extend_abbreviation(segment, m.range());
        if attrs.iter().any(|a| overlaps(&a.span, &span)) {
            continue;
        }
        attrs.push(Attr {
            value: segment[span.clone()]
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase(),
            span,
            kind: AttrKind::Frequency,
        });
    }

    for m in ROUTE_RE.find_iter(segment) {
        let span = extend_abbreviation(segment, m.range());
        if attrs.iter().any(|a| overlaps(&a.span, &span)) {
            continue;
        }
        attrs.push(Attr {
            value: segment[span.clone()].to_owned(),
            span,
            kind: AttrKind::Route,
        });
    }

    attrs.sort_by_key(|a| a.span.start);
    attrs
}

fn names(catalog: &Catalog, segment: &str, attrs: &[Attr]) -> Vec<NameSpan> {
    let words: Vec<Range<usize>> = WORD_RE
        .find_iter(segment)
        .map(|m| m.range())
        .filter(|w| !attrs.iter().any(|a| overlaps(&a.span, w)))
        .collect();

    let mut found: Vec<NameSpan> = Vec::new();
    let mut i = 0;

    // Catalog phrases, longest first.
    while i < words.len() {
        let mut matched = None;
        for len in (1..=MAX_NAME_WORDS.min(words.len() - i)).rev() {
            let phrase_words = &words[i..i + len];
            let contiguous = phrase_words
                .windows(2)
                .all(|w| segment[w[0].end..w[1].start].trim().is_empty());
            if !contiguous {
                continue;
            }
            let span = phrase_words[0].start..phrase_words[len - 1].end;
            if catalog.resolve_exact(&segment[span.clone()]).is_some() {
                matched = Some((span, len));
                break;
            }
        }

        match matched {
            Some((span, len)) => {
                found.push(NameSpan {
                    text: segment[span.clone()].to_owned(),
                    span,
                });
                i += len;
            }
            None => i += 1,
        }
    }

    // Unknown words anchored by a following dose.
    for dose in attrs.iter().filter(|a| a.kind == AttrKind::Dose) {
        let Some(prev) = words.iter().rev().find(|w| w.end <= dose.span.start) else {
            continue;
        };
        let between = &segment[prev.end..dose.span.start];
        if !between.chars().all(|c| c.is_whitespace() || c == ',' || c == ':') {
            continue;
        }
        if found.iter().any(|n| overlaps(&n.span, prev)) {
            continue;
        }
        let word = &segment[prev.clone()];
        if STOP_WORDS.contains(&word.to_lowercase().as_str()) {
            continue;
        }
        found.push(NameSpan {
            span: prev.clone(),
            text: word.to_owned(),
        });
    }

    found.sort_by_key(|n| n.span.start);
    found
}

fn extract_segment(catalog: &Catalog, segment: &str) -> Vec<DrugMention> {
    let attrs = attributes(catalog, segment);
    let names = names(catalog, segment, &attrs);
    if names.is_empty() {
        return Vec::new();
    }

    let mut mentions: Vec<DrugMention> = names
        .iter()
        .map(|n| DrugMention {
            name: n.text.clone(),
            dosage: None,
            frequency: None,
            route: Route::default(),
        })
        .collect();
    let mut route_set = vec![false; names.len()];

    for attr in &attrs {
        let prev = names.iter().rposition(|n| n.span.end <= attr.span.start);
        let next = names.iter().position(|n| n.span.start >= attr.span.end);
        let has_kind = |i: usize| match attr.kind {
            AttrKind::Dose => mentions[i].dosage.is_some(),
            AttrKind::Frequency => mentions[i].frequency.is_some(),
            AttrKind::Route => route_set[i],
        };

        let owner = match (prev, next) {
            (Some(p), Some(n))
                if joined_by_of(segment, attr, &attrs, &names[n])
                    || (has_kind(p) && !has_kind(n)) =>
            {
                n
            }
            (Some(p), _) => p,
            (None, _) => 0,
        };
        let mention = &mut mentions[owner];

        match attr.kind {
            AttrKind::Dose if mention.dosage.is_none() => mention.dosage = Some(attr.value.clone()),
            AttrKind::Frequency if mention.frequency.is_none() => {
                mention.frequency = Some(attr.value.clone())
            }
            AttrKind::Route if !route_set[owner] => {
                mention.route = Route::parse(&attr.value);
                route_set[owner] = true;
            }
            _ => {}
        }
    }

    mentions
}

/// Whether only other attributes and the connector "of" stand between `attr` and `name`.
fn joined_by_of(segment: &str, attr: &Attr, attrs: &[Attr], name: &NameSpan) -> bool {
    let gap = attr.span.end..name.span.start;
    let mut words = Vec::new();
    for m in WORD_RE.find_iter(&segment[gap.clone()]) {
        let at = gap.start + m.start()..gap.start + m.end();
        if !attrs.iter().any(|a| overlaps(&a.span, &at)) {
            words.push(m.as_str());
        }
    }
    !words.is_empty() && words.iter().all(|w| w.eq_ignore_ascii_case("of"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::reference_catalog;

    fn mention(name: &str, dosage: Option<&str>, frequency: Option<&str>) -> DrugMention {
        DrugMention {
            name: name.into(),
            dosage: dosage.map(Into::into),
            frequency: frequency.map(Into::into),
            route: Route::Oral,
        }
    }

    #[test]
    fn empty_text_yields_no_mentions() {
        let catalog = reference_catalog();
        assert!(extract(&catalog, "").is_empty());
        assert!(extract(&catalog, "   \n ").is_empty());
    }

    #[test]
    fn extracts_two_drugs_with_dose_and_frequency() {
        let catalog = reference_catalog();
        let mentions = extract(
            &catalog,
            "Aspirin 325mg twice daily and Warfarin 5mg once daily",
        );
        assert_eq!(
            mentions,
            vec![
                mention("Aspirin", Some("325mg"), Some("twice daily")),
                mention("Warfarin", Some("5mg"), Some("once daily")),
            ]
        );
    }

    #[test]
    fn extracts_sample_note_across_sentences() {
        let catalog = reference_catalog();
        let mentions = extract(
            &catalog,
            "Patient prescribed Aspirin 325mg twice daily and Warfarin 5mg once daily for atrial fibrillation. Also taking Metformin 500mg twice daily for diabetes.",
        );
        let names: Vec<_> = mentions.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Aspirin", "Warfarin", "Metformin"]);
        assert_eq!(mentions[2].dosage.as_deref(), Some("500mg"));
    }

    #[test]
    fn tolerates_reordering_and_missing_fields() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Give 5 mg IV of warfarin. Metformin.");
        assert_eq!(
            mentions,
            vec![
                DrugMention {
                    name: "warfarin".into(),
                    dosage: Some("5mg".into()),
                    frequency: None,
                    route: Route::Iv,
                },
                mention("Metformin", None, None),
            ]
        );
    }

    #[test]
    fn keeps_decimal_doses_in_one_segment() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Digoxin 0.125 mg daily.");
        assert_eq!(mentions, vec![mention("Digoxin", Some("0.125mg"), Some("daily"))]);
    }

    #[test]
    fn matches_multi_word_synonyms() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "on acetylsalicylic acid 81mg daily");
        assert_eq!(
            mentions,
            vec![mention("acetylsalicylic acid", Some("81mg"), Some("daily"))]
        );
    }

    #[test]
    fn unknown_word_before_dose_is_still_a_mention() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Started Zorblex 20mg at bedtime");
        assert_eq!(
            mentions,
            vec![mention("Zorblex", Some("20mg"), Some("at bedtime"))]
        );
    }

    #[test]
    fn stop_words_are_not_names() {
        let catalog = reference_catalog();
        assert!(extract(&catalog, "take 20mg twice daily").is_empty());
    }

    #[test]
    fn deduplicates_identical_mentions() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Aspirin 81mg daily. Aspirin 81mg daily. ASPIRIN 81mg daily");
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].name, "Aspirin");
        assert_eq!(mentions[1].name, "ASPIRIN");
    }

    #[test]
    fn output_is_deterministic() {
        let catalog = reference_catalog();
        let text = "Warfarin 5mg od; aspirin 75mg od! Metformin 1g bid?";
        assert_eq!(extract(&catalog, text), extract(&catalog, text));
    }

    #[test]
    fn dose_before_name_attaches_forward() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Give 5mg of warfarin and 325mg of aspirin");
        assert_eq!(
            mentions,
            vec![
                mention("warfarin", Some("5mg"), None),
                mention("aspirin", Some("325mg"), None),
            ]
        );
    }

    #[test]
    fn second_dose_moves_to_the_next_name() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Warfarin 5mg daily, 75mg aspirin");
        assert_eq!(
            mentions,
            vec![
                mention("Warfarin", Some("5mg"), Some("daily")),
                mention("aspirin", Some("75mg"), None),
            ]
        );
    }

    #[test]
    fn dotted_abbreviations_stay_in_one_segment() {
        let catalog = reference_catalog();
        let mentions = extract(&catalog, "Metformin 500mg p.o. b.i.d.");
        assert_eq!(
            mentions,
            vec![mention("Metformin", Some("500mg"), Some("b.i.d."))]
        );

        let mentions = extract(&catalog, "Digoxin 0.125mg i.v. q.d. Warfarin 5mg od.");
        assert_eq!(mentions.len(), 2);
        assert_eq!(mentions[0].route, Route::Iv);
        assert_eq!(mentions[0].frequency.as_deref(), Some("q.d."));
        assert_eq!(mentions[1].name, "Warfarin");
    }

    #[test]
    fn sentence_ending_in_a_word_still_splits() {
        assert_eq!(segments("Take warfarin. Stop aspirin."), vec!["Take warfarin", " Stop aspirin"]);
    }

    #[test]
    fn percent_unit_is_recognised_before_whitespace() {
        let caps = DOSE_RE.captures("cream 5% daily").unwrap();
        assert_eq!(&caps[1], "5");
        assert_eq!(&caps[2], "%");

        let caps = DOSE_RE.captures("Aspirin 325 mg daily").unwrap();
        assert_eq!(&caps[2], "mg");
    }
}
