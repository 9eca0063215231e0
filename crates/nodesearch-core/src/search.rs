//! Search parameters, results and the post-processing every backend shares:
//! filtering, sorting, facet counting, pagination and highlighting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::filter::{lookup, Filter};
use crate::types::{fields, DocumentId, GeoPoint, Hit};

pub const DEFAULT_LIMIT: usize = 20;
pub const DEFAULT_CROP_LENGTH: usize = 10;
pub const DEFAULT_CROP_MARKER: &str = "…";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Documents matching any query term.
    #[default]
    Last,
    /// Only documents matching every query term.
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParameters {
    /// Predicates, conjoined with `AND` when sent.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub page: Option<usize>,
    pub hits_per_page: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_highlight: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes_to_crop: Vec<String>,
    pub crop_length: Option<usize>,
    pub crop_marker: Option<String>,
    pub highlight_pre_tag: Option<String>,
    pub highlight_post_tag: Option<String>,
    pub matching_strategy: Option<MatchingStrategy>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<String>,
}

impl SearchParameters {
    /// The filter list joined into one expression, as the wire format wants it.
    pub fn filter_expression(&self) -> Option<String> {
        if self.filter.is_empty() { None } else { Some(self.filter.join(" AND ")) }
    }

    pub fn matching_strategy(&self) -> MatchingStrategy { self.matching_strategy.unwrap_or_default() }

    fn is_paged(&self) -> bool { self.page.is_some() || self.hits_per_page.is_some() }
}

pub type FacetDistribution = BTreeMap<String, BTreeMap<String, u64>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub hits: Vec<Hit>,
    pub query: String,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
    pub estimated_total_hits: Option<usize>,
    pub page: Option<usize>,
    pub hits_per_page: Option<usize>,
    pub total_hits: Option<usize>,
    pub total_pages: Option<usize>,
    #[serde(default)]
    pub facet_distribution: FacetDistribution,
}

impl SearchResult {
    pub fn document_ids(&self) -> Vec<DocumentId> {
        self.hits.iter().filter_map(|h| h.get(fields::ID).and_then(Value::as_str).map(str::to_string)).collect()
    }

    /// Exact total in page mode, otherwise the estimate.
    pub fn total(&self) -> usize { self.total_hits.or(self.estimated_total_hits).unwrap_or(self.hits.len()) }
}

/// A candidate produced by a backend before post-processing.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub score: f32,
    pub document: Hit,
}

/// Apply filter, sort, facets, pagination and formatting to backend
/// candidates. Candidates are expected in relevance order.
pub fn finalize(query: &str, candidates: Vec<ScoredDocument>, parameters: &SearchParameters) -> Result<SearchResult> {
    let filter = Filter::parse_all(&parameters.filter)?;
    let mut matched: Vec<ScoredDocument> = match &filter {
        Some(f) => candidates.into_iter().filter(|c| f.matches(&c.document)).collect(),
        None => candidates,
    };

    let rules = parameters.sort.iter().map(|s| SortRule::parse(s)).collect::<Result<Vec<_>>>()?;
    if !rules.is_empty() {
        matched.sort_by(|a, b| {
            rules
                .iter()
                .map(|rule| rule.compare(&a.document, &b.document))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or_else(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        });
    }

    let facet_distribution = facet_distribution(&matched, &parameters.facets);
    let total = matched.len();
    let mut result = SearchResult { query: query.to_string(), facet_distribution, ..SearchResult::default() };

    let (skip, take) = if parameters.is_paged() {
        let page = parameters.page.unwrap_or(1).max(1);
        let per_page = parameters.hits_per_page.unwrap_or(DEFAULT_LIMIT);
        result.page = Some(page);
        result.hits_per_page = Some(per_page);
        result.total_hits = Some(total);
        result.total_pages = Some(if per_page == 0 { 0 } else { total.div_ceil(per_page) });
        ((page - 1).saturating_mul(per_page), per_page)
    } else {
        let offset = parameters.offset.unwrap_or(0);
        let limit = parameters.limit.unwrap_or(DEFAULT_LIMIT);
        result.offset = Some(offset);
        result.limit = Some(limit);
        result.estimated_total_hits = Some(total);
        (offset, limit)
    };

    let terms = query_terms(query);
    result.hits = matched
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|c| format_hit(c.document, &terms, parameters))
        .collect();
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Field(String),
    Geo(GeoPoint),
}

#[derive(Debug, Clone, PartialEq)]
struct SortRule {
    key: SortKey,
    descending: bool,
}

impl SortRule {
    fn parse(rule: &str) -> Result<Self> {
        let (key, direction) = rule
            .rsplit_once(':')
            .ok_or_else(|| Error::InvalidFilter(format!("sort rule '{rule}' needs ':asc' or ':desc'")))?;
        let descending = match direction.trim() {
            "asc" => false,
            "desc" => true,
            other => return Err(Error::InvalidFilter(format!("unknown sort direction '{other}'"))),
        };
        let key = key.trim();
        let key = match key.strip_prefix("_geoPoint(").and_then(|k| k.strip_suffix(')')) {
            Some(coords) => {
                let mut parts = coords.split(',').map(|p| p.trim().parse::<f64>());
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(Ok(lat)), Some(Ok(lng)), None) => SortKey::Geo(GeoPoint { lat, lng }),
                    _ => return Err(Error::InvalidFilter(format!("malformed geo sort '{rule}'"))),
                }
            }
            None => SortKey::Field(key.to_string()),
        };
        Ok(Self { key, descending })
    }

    /// Documents without a sortable value always go last.
    fn compare(&self, a: &Map<String, Value>, b: &Map<String, Value>) -> Ordering {
        let ordering = match &self.key {
            SortKey::Field(field) => {
                let (va, vb) = (lookup(a, field), lookup(b, field));
                match (sortable(va), sortable(vb)) {
                    (Some(x), Some(y)) => x.cmp_with(&y),
                    (Some(_), None) => return Ordering::Less,
                    (None, Some(_)) => return Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
            SortKey::Geo(center) => {
                let da = a.get(fields::GEO).and_then(GeoPoint::from_value).map(|p| p.distance_to(center));
                let db = b.get(fields::GEO).and_then(GeoPoint::from_value).map(|p| p.distance_to(center));
                match (da, db) {
                    (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    (Some(_), None) => return Ordering::Less,
                    (None, Some(_)) => return Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            }
        };
        if self.descending { ordering.reverse() } else { ordering }
    }
}

enum Sortable<'a> {
    Number(f64),
    Text(&'a str),
}

impl Sortable<'_> {
    fn cmp_with(&self, other: &Sortable<'_>) -> Ordering {
        match (self, other) {
            (Sortable::Number(a), Sortable::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Sortable::Number(_), Sortable::Text(_)) => Ordering::Less,
            (Sortable::Text(_), Sortable::Number(_)) => Ordering::Greater,
            (Sortable::Text(a), Sortable::Text(b)) => a.cmp(b),
        }
    }
}

fn sortable(value: Option<&Value>) -> Option<Sortable<'_>> {
    match value? {
        Value::Number(n) => n.as_f64().map(Sortable::Number),
        Value::String(s) => Some(Sortable::Text(s)),
        Value::Bool(b) => Some(Sortable::Number(if *b { 1.0 } else { 0.0 })),
        _ => None,
    }
}

fn facet_distribution(matched: &[ScoredDocument], facets: &[String]) -> FacetDistribution {
    let mut distribution = FacetDistribution::new();
    for facet in facets {
        let counts = distribution.entry(facet.clone()).or_default();
        for candidate in matched {
            let values: Vec<&Value> = match lookup(&candidate.document, facet) {
                Some(Value::Array(items)) => items.iter().collect(),
                Some(v) => vec![v],
                None => continue,
            };
            for value in values {
                let key = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(_) | Value::Bool(_) => value.to_string(),
                    _ => continue,
                };
                *counts.entry(key).or_insert(0) += 1;
            }
        }
    }
    distribution
}

/// Lowercased alphanumeric query terms.
pub fn query_terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// All searchable text of a stored document: title, fulltext buckets and
/// string-valued fields (system fields excluded).
pub fn document_text(document: &Map<String, Value>) -> Vec<String> {
    let mut texts = Vec::new();
    for (name, value) in document {
        if name == fields::FULLTEXT {
            if let Value::Object(buckets) = value {
                for bucket in buckets.values() {
                    collect_strings(bucket, &mut texts);
                }
            }
        } else if name == fields::TITLE || (!name.starts_with('_') && name != fields::ID && name != fields::URI) {
            collect_strings(value, &mut texts);
        }
    }
    texts
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.trim().is_empty() => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|i| collect_strings(i, out)),
        _ => {}
    }
}

fn format_hit(mut hit: Hit, terms: &[String], parameters: &SearchParameters) -> Hit {
    if parameters.attributes_to_highlight.is_empty() && parameters.attributes_to_crop.is_empty() {
        return hit;
    }
    let pre = parameters.highlight_pre_tag.as_deref().unwrap_or("<em>");
    let post = parameters.highlight_post_tag.as_deref().unwrap_or("</em>");
    let crop_length = parameters.crop_length.unwrap_or(DEFAULT_CROP_LENGTH);
    let marker = parameters.crop_marker.as_deref().unwrap_or(DEFAULT_CROP_MARKER);

    let mut formatted = Map::new();
    for (name, value) in &hit {
        let highlight = wants(&parameters.attributes_to_highlight, name);
        let crop = wants(&parameters.attributes_to_crop, name);
        if !highlight && !crop {
            continue;
        }
        let transform = |text: &str| {
            let (body, before, after) = if crop { crop_window(text, terms, crop_length) } else { (text.to_string(), false, false) };
            let body = if highlight { highlight_text(&body, terms, pre, post) } else { body };
            let lead = if before { marker } else { "" };
            let tail = if after { marker } else { "" };
            format!("{lead}{body}{tail}")
        };
        formatted.insert(name.clone(), map_strings(value, &transform));
    }
    hit.insert(fields::FORMATTED.to_string(), Value::Object(formatted));
    hit
}

fn wants(attributes: &[String], name: &str) -> bool { attributes.iter().any(|a| a == "*" || a == name) }

fn map_strings(value: &Value, transform: &dyn Fn(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(transform(s)),
        Value::Array(items) => Value::Array(items.iter().map(|i| map_strings(i, transform)).collect()),
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), map_strings(v, transform))).collect()),
        other => other.clone(),
    }
}

fn word_matches(word: &str, terms: &[String]) -> bool {
    let normalized: String = word.chars().filter(|c| c.is_alphanumeric()).collect::<String>().to_lowercase();
    !normalized.is_empty() && terms.iter().any(|t| normalized.starts_with(t.as_str()))
}

fn highlight_text(text: &str, terms: &[String], pre: &str, post: &str) -> String {
    if terms.is_empty() {
        return text.to_string();
    }
    text.split(' ')
        .map(|word| if word_matches(word, terms) { format!("{pre}{word}{post}") } else { word.to_string() })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keep `length` words around the first match. Also reports whether words
/// were dropped before and after the window.
fn crop_window(text: &str, terms: &[String], length: usize) -> (String, bool, bool) {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= length {
        return (words.join(" "), false, false);
    }
    let first = words.iter().position(|w| word_matches(w, terms)).unwrap_or(0);
    let start = first.saturating_sub(length / 2).min(words.len() - length);
    let end = start + length;
    (words[start..end].join(" "), start > 0, end < words.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(score: f32, value: Value) -> ScoredDocument {
        let Value::Object(document) = value else { return ScoredDocument { score, document: Map::new() } };
        ScoredDocument { score, document }
    }

    #[test]
    fn page_mode_reports_totals() {
        let candidates = (0..5).map(|i| candidate(1.0, json!({"id": format!("d{i}")}))).collect();
        let params = SearchParameters { page: Some(2), hits_per_page: Some(2), ..Default::default() };
        let result = finalize("", candidates, &params).unwrap();
        assert_eq!(result.document_ids(), vec!["d2", "d3"]);
        assert_eq!(result.total_hits, Some(5));
        assert_eq!(result.total_pages, Some(3));
        assert_eq!(result.estimated_total_hits, None);
    }

    #[test]
    fn sort_and_facets() {
        let candidates = vec![
            candidate(3.0, json!({"id": "a", "rank": 2, "tags": ["x", "y"]})),
            candidate(2.0, json!({"id": "b", "rank": 1, "tags": ["x"]})),
            candidate(1.0, json!({"id": "c"})),
        ];
        let params = SearchParameters {
            sort: vec!["rank:asc".into()],
            facets: vec!["tags".into()],
            ..Default::default()
        };
        let result = finalize("", candidates, &params).unwrap();
        assert_eq!(result.document_ids(), vec!["b", "a", "c"]);
        assert_eq!(result.facet_distribution["tags"]["x"], 2);
        assert_eq!(result.facet_distribution["tags"]["y"], 1);
    }

    #[test]
    fn highlight_and_crop_into_formatted() {
        let text = "one two three four five six seven eight nine ten eleven twelve needle thirteen";
        let candidates = vec![candidate(1.0, json!({"id": "a", "body": text}))];
        let params = SearchParameters {
            attributes_to_highlight: vec!["body".into()],
            attributes_to_crop: vec!["body".into()],
            crop_length: Some(4),
            crop_marker: Some("...".into()),
            ..Default::default()
        };
        let result = finalize("needle", candidates, &params).unwrap();
        let formatted = result.hits[0][fields::FORMATTED]["body"].as_str().unwrap_or_default().to_string();
        assert_eq!(formatted, "...eleven twelve <em>needle</em> thirteen");
    }

    #[test]
    fn crop_marker_stays_outside_highlight_tags() {
        let candidates = vec![candidate(1.0, json!({"id": "a", "title": "needle in a haystack"}))];
        let params = SearchParameters {
            attributes_to_highlight: vec!["title".into()],
            attributes_to_crop: vec!["title".into()],
            crop_length: Some(1),
            crop_marker: Some("~".into()),
            ..Default::default()
        };
        let result = finalize("needle", candidates, &params).unwrap();
        assert_eq!(result.hits[0][fields::FORMATTED]["title"], json!("<em>needle</em>~"));
    }

    #[test]
    fn invalid_sort_rule_is_an_error() {
        let params = SearchParameters { sort: vec!["rank".into()], ..Default::default() };
        assert!(finalize("", Vec::new(), &params).is_err());
    }
}
