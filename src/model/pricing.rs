use crate::web::models::Usage;

/// USD per 1K tokens: (model prefix, prompt price, completion price).
const PRICES_PER_1K: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.000_15, 0.000_6),
    ("gpt-4o", 0.002_5, 0.01),
    ("gpt-4-turbo", 0.01, 0.03),
    ("gpt-4", 0.03, 0.06),
    ("gpt-35-turbo", 0.000_5, 0.001_5),
    ("gpt-3.5-turbo", 0.000_5, 0.001_5),
    ("claude-3-opus", 0.015, 0.075),
    ("claude-3-sonnet", 0.003, 0.015),
    ("claude-3-haiku", 0.000_25, 0.001_25),
];

/// Cost of a completion, or `None` when the model is not in the price table.
///
/// A `provider/` prefix is ignored and the longest matching prefix wins, so
/// `gpt-4o-mini-2024-07-18` is never billed as `gpt-4`.
pub fn completion_cost(model: &str, usage: &Usage) -> Option<f64> {
    let base = model.rsplit('/').next().unwrap_or(model);
    let (_, prompt, completion) = PRICES_PER_1K
        .iter()
        .filter(|(prefix, _, _)| base.starts_with(prefix))
        .max_by_key(|(prefix, _, _)| prefix.len())?;
    Some(
        usage.prompt_tokens as f64 / 1000.0 * prompt
            + usage.completion_tokens as f64 / 1000.0 * completion,
    )
}
