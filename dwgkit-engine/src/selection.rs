use std::collections::HashSet;

use dwgkit_core::document::EntityKind;
use regex::Regex;
use tracing::debug;

use crate::errors::EngineError;

#[derive(Debug, Clone)]
enum Token {
    Defaults,
    Kind(EntityKind),
    Pattern { text: String, regex: Regex },
}

/// 查询的实体类型集合。
///
/// 名称以逗号或空白分隔，大小写不敏感；`*` / `ALL` 表示默认集合，
/// 含 `*?[]` 的名称按通配符匹配。未点名任何类型时使用默认集合：
/// 文档中出现过的类型，去掉只在显式点名时返回的顶点与 SEQEND。
#[derive(Debug, Clone, Default)]
pub struct TypeSelection {
    tokens: Vec<Token>,
}

impl TypeSelection {
    /// 默认集合。
    pub fn defaults() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, EngineError> {
        Self::from_names(
            text.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|name| !name.is_empty()),
        )
    }

    pub fn from_names<I, T>(names: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut tokens = Vec::new();
        for name in names {
            let name = name.as_ref().trim().to_ascii_uppercase();
            if name.is_empty() {
                continue;
            }
            let token = if name == "*" || name == "ALL" {
                Token::Defaults
            } else if is_glob(&name) {
                Token::Pattern {
                    regex: glob_regex(&name)?,
                    text: name,
                }
            } else {
                EntityKind::from_name(&name)
                    .map(Token::Kind)
                    .ok_or(EngineError::UnsupportedType(name))?
            };
            tokens.push(token);
        }
        Ok(Self { tokens })
    }

    #[inline]
    pub fn is_default(&self) -> bool {
        self.tokens.is_empty()
    }

    /// 按出现顺序展开为具体类型并去重。`present` 为空表示对象头索引不可用，此时以全部类型为准。
    pub fn resolve(&self, present: &[EntityKind]) -> Vec<EntityKind> {
        let universe: Vec<EntityKind> = if present.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            present.to_vec()
        };
        let defaults: Vec<EntityKind> = universe
            .iter()
            .copied()
            .filter(|kind| !kind.is_explicit_only())
            .collect();
        if self.tokens.is_empty() {
            return defaults;
        }

        let mut seen = HashSet::new();
        let mut kinds = Vec::new();
        for token in &self.tokens {
            let expanded: Vec<EntityKind> = match token {
                Token::Defaults => defaults.clone(),
                Token::Kind(kind) => vec![*kind],
                Token::Pattern { text, regex } => {
                    let matched: Vec<EntityKind> = EntityKind::ALL
                        .into_iter()
                        .filter(|kind| universe.contains(kind) && regex.is_match(kind.dxftype()))
                        .collect();
                    if matched.is_empty() {
                        debug!(pattern = %text, "通配符未匹配到任何类型");
                    }
                    matched
                }
            };
            kinds.extend(expanded.into_iter().filter(|kind| seen.insert(*kind)));
        }
        kinds
    }
}

fn is_glob(name: &str) -> bool {
    name.contains(['*', '?', '['])
}

/// 通配符转正则：`*` 任意串，`?` 单字符，`[...]` 字符类（`[!...]` 取反），其余字面匹配。
fn glob_regex(pattern: &str) -> Result<Regex, EngineError> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => match chars[i + 1..].iter().position(|c| *c == ']') {
                Some(len) => {
                    let class: String = chars[i + 1..i + 1 + len].iter().collect();
                    out.push('[');
                    match class.strip_prefix('!') {
                        Some(rest) => {
                            out.push('^');
                            out.push_str(&regex::escape(rest));
                        }
                        None => out.push_str(&regex::escape(&class)),
                    }
                    out.push(']');
                    i += len + 1;
                }
                None => out.push_str(&regex::escape("[")),
            },
            other => out.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out).map_err(|_| EngineError::UnsupportedType(pattern.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn present() -> Vec<EntityKind> {
        vec![
            EntityKind::Line,
            EntityKind::Polyline2d,
            EntityKind::Vertex2d,
            EntityKind::Polyline3d,
            EntityKind::Vertex3d,
            EntityKind::Seqend,
            EntityKind::Solid3d,
        ]
    }

    #[test]
    fn default_selection_skips_explicit_only_kinds() {
        let kinds = TypeSelection::defaults().resolve(&present());
        assert_eq!(
            kinds,
            vec![
                EntityKind::Line,
                EntityKind::Polyline2d,
                EntityKind::Polyline3d,
                EntityKind::Solid3d,
            ]
        );

        let fallback = TypeSelection::defaults().resolve(&[]);
        assert_eq!(fallback.len(), 11);
        assert!(fallback.iter().all(|kind| !kind.is_explicit_only()));
    }

    #[test]
    fn parses_names_case_insensitively_and_dedupes() {
        let selection = TypeSelection::parse("line, seqend  LINE,vertex_2d").expect("parse");
        assert_eq!(
            selection.resolve(&present()),
            vec![EntityKind::Line, EntityKind::Seqend, EntityKind::Vertex2d]
        );
    }

    #[test]
    fn star_expands_to_defaults_in_place() {
        let selection = TypeSelection::parse("SEQEND,*").expect("parse");
        assert_eq!(
            selection.resolve(&present()),
            vec![
                EntityKind::Seqend,
                EntityKind::Line,
                EntityKind::Polyline2d,
                EntityKind::Polyline3d,
                EntityKind::Solid3d,
            ]
        );
    }

    #[test]
    fn globs_match_present_kinds_including_vertices() {
        let selection = TypeSelection::parse("VERTEX_?D POLYLINE_* REGION*").expect("parse");
        assert_eq!(
            selection.resolve(&present()),
            vec![
                EntityKind::Vertex2d,
                EntityKind::Vertex3d,
                EntityKind::Polyline2d,
                EntityKind::Polyline3d,
            ]
        );

        let classes = TypeSelection::parse("VERTEX_[!2]D").expect("parse");
        assert_eq!(classes.resolve(&present()), vec![EntityKind::Vertex3d]);
    }

    #[test]
    fn unknown_literal_is_unsupported() {
        let err = TypeSelection::parse("LINE, HATCH").expect_err("HATCH is not supported");
        assert!(matches!(err, EngineError::UnsupportedType(ref name) if name == "HATCH"));
    }
}
