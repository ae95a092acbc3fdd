use std::fmt;

use crate::ast;
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn reverse(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

/// Parsed `$orderby`; an empty list means "no explicit order".
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ODataOrderBy(pub Vec<OrderKey>);

impl ODataOrderBy {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a `$orderby` value: `field1 [asc|desc], field2 [asc|desc]`.
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let mut keys = Vec::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = part.split_whitespace().collect();
            let (field, dir) = match tokens.as_slice() {
                [field] => (*field, SortDir::Asc),
                [field, dir] if dir.eq_ignore_ascii_case("asc") => (*field, SortDir::Asc),
                [field, dir] if dir.eq_ignore_ascii_case("desc") => (*field, SortDir::Desc),
                _ => {
                    return Err(Error::InvalidOrderByField(format!(
                        "invalid orderby clause: {part}"
                    )))
                }
            };
            keys.push(OrderKey {
                field: field.to_string(),
                dir,
            });
        }
        Ok(Self(keys))
    }

    /// `+field` for ascending, `-field` for descending, comma separated.
    pub fn to_signed_tokens(&self) -> String {
        self.0
            .iter()
            .map(|k| match k.dir {
                SortDir::Asc => format!("+{}", k.field),
                SortDir::Desc => format!("-{}", k.field),
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_signed_tokens(signed: &str) -> Result<Self, Error> {
        let mut keys = Vec::new();
        for raw in signed.split(',') {
            let token = raw.trim();
            if token.is_empty() {
                continue;
            }
            let (dir, field) = match token.as_bytes()[0] {
                b'+' => (SortDir::Asc, &token[1..]),
                b'-' => (SortDir::Desc, &token[1..]),
                _ => (SortDir::Asc, token),
            };
            if field.is_empty() {
                return Err(Error::InvalidOrderByField(token.to_string()));
            }
            keys.push(OrderKey {
                field: field.to_string(),
                dir,
            });
        }
        if keys.is_empty() {
            return Err(Error::InvalidOrderByField("empty order".to_string()));
        }
        Ok(Self(keys))
    }

    /// Append `tiebreaker` unless the order already mentions it.
    pub fn ensure_tiebreaker(mut self, tiebreaker: &str, dir: SortDir) -> Self {
        if !self.0.iter().any(|k| k.field == tiebreaker) {
            self.0.push(OrderKey {
                field: tiebreaker.to_string(),
                dir,
            });
        }
        self
    }
}

impl fmt::Display for ODataOrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("(none)");
        }
        let parts = self
            .0
            .iter()
            .map(|k| {
                let dir = match k.dir {
                    SortDir::Asc => "asc",
                    SortDir::Desc => "desc",
                };
                format!("{} {}", k.field, dir)
            })
            .collect::<Vec<_>>();
        f.write_str(&parts.join(", "))
    }
}

/// A `$filter` either already parsed or still in its raw URL form.
/// Raw filters are parsed when the query is compiled, so a malformed
/// filter inside an `$expand` surfaces as a client error at that point.
#[derive(Clone, Debug)]
pub enum FilterOption {
    Ast(ast::Expr),
    Raw(String),
}

impl From<ast::Expr> for FilterOption {
    fn from(expr: ast::Expr) -> Self {
        FilterOption::Ast(expr)
    }
}

/// Query options of one request level (root or one `$expand` item).
#[derive(Clone, Debug, Default)]
pub struct ODataQuery {
    pub filter: Option<FilterOption>,
    /// Empty means `$select=*`.
    pub select: Vec<String>,
    pub order: ODataOrderBy,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub count: bool,
    pub expand: Vec<ExpandItem>,
}

impl ODataQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, expr: ast::Expr) -> Self {
        self.filter = Some(FilterOption::Ast(expr));
        self
    }

    pub fn with_raw_filter(mut self, raw: impl Into<String>) -> Self {
        self.filter = Some(FilterOption::Raw(raw.into()));
        self
    }

    pub fn with_select<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_order(mut self, order: ODataOrderBy) -> Self {
        self.order = order;
        self
    }

    pub fn with_top(mut self, top: u64) -> Self {
        self.top = Some(top);
        self
    }

    pub fn with_skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn with_count(mut self, count: bool) -> Self {
        self.count = count;
        self
    }

    pub fn with_expand(mut self, item: ExpandItem) -> Self {
        self.expand.push(item);
        self
    }

    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    pub fn has_expand(&self) -> bool {
        !self.expand.is_empty()
    }

    pub fn has_paging(&self) -> bool {
        self.top.is_some() || self.skip.is_some()
    }

    pub fn selects_all(&self) -> bool {
        self.select.is_empty() || self.select.iter().any(|s| s == "*")
    }
}

/// One `$expand` entry: the navigation property plus its nested options.
#[derive(Clone, Debug)]
pub struct ExpandItem {
    pub navigation: String,
    pub options: ODataQuery,
}

impl ExpandItem {
    pub fn new(navigation: impl Into<String>) -> Self {
        Self {
            navigation: navigation.into(),
            options: ODataQuery::default(),
        }
    }

    pub fn with_options(mut self, options: ODataQuery) -> Self {
        self.options = options;
        self
    }
}
