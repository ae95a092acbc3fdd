use std::collections::HashSet;
use std::sync::Arc;

use odata_core::ast::Value;

use crate::builder::CriteriaBuilder;
use crate::error::{CriteriaError, CriteriaResult};
use crate::expression::{Expression, Order};
use crate::from::{joins_of, render_conjunction, root_discriminators, FromRef, JoinNode, JoinType, RootNode};
use crate::metadata::EntityType;
use crate::predicate::Predicate;
use crate::tuple::TupleElement;
use crate::writer::{SqlConvertible, SqlWriter};

/// One SELECT list entry.
#[derive(Clone, Debug)]
pub struct SelectItem {
    pub expression: Expression,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn new(expression: Expression) -> Self {
        Self {
            expression,
            alias: None,
        }
    }

    pub fn aliased(expression: Expression, alias: impl Into<String>) -> Self {
        Self {
            expression,
            alias: Some(alias.into()),
        }
    }

    /// Explicit alias, falling back to the path alias.
    pub fn effective_alias(&self) -> Option<&str> {
        self.alias.as_deref().or_else(|| self.expression.alias())
    }
}

impl From<Expression> for SelectItem {
    fn from(expression: Expression) -> Self {
        SelectItem::new(expression)
    }
}

/// Rendered statement: SQL text, bind values in position order and the
/// shape of the result rows.
#[derive(Clone, Debug)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<Value>,
    pub elements: Arc<[TupleElement]>,
}

/// A SELECT statement, also used as subquery.
#[derive(Clone, Debug, Default)]
pub struct CriteriaQuery {
    selection: Vec<SelectItem>,
    distinct: bool,
    roots: Vec<RootNode>,
    restriction: Option<Predicate>,
    group_by: Vec<Expression>,
    having: Option<Predicate>,
    order_by: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl CriteriaQuery {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a root for the entity type named `entity`.
    pub fn from(&mut self, cb: &mut CriteriaBuilder, entity: &str) -> CriteriaResult<FromRef> {
        let et = cb.service_document().entity_type(entity)?;
        Ok(self.from_entity(cb, et))
    }

    pub fn from_entity(&mut self, cb: &mut CriteriaBuilder, entity: Arc<EntityType>) -> FromRef {
        let from = FromRef::entity_source(cb.next_alias(), entity);
        self.roots.push(RootNode::new(from.clone()));
        from
    }

    /// Join a navigation or collection property of `parent`, which must be
    /// a root or join of this query.
    pub fn join(
        &mut self,
        cb: &mut CriteriaBuilder,
        parent: &FromRef,
        attribute: &str,
        join_type: JoinType,
    ) -> CriteriaResult<FromRef> {
        let node = JoinNode::create(cb, parent, attribute, join_type)?;
        let from = node.from_ref().clone();
        let joins = joins_of(&mut self.roots, parent.alias()).ok_or_else(|| {
            CriteriaError::argument(format!(
                "'{}' is not part of the FROM clause",
                parent.alias()
            ))
        })?;
        joins.push(node);
        Ok(from)
    }

    pub fn roots(&self) -> Vec<FromRef> {
        self.roots.iter().map(|r| r.from.clone()).collect()
    }

    /// Replace the selection. Aliases must be unique.
    pub fn multiselect<I, S>(&mut self, items: I) -> CriteriaResult<&mut Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<SelectItem>,
    {
        let items: Vec<SelectItem> = items.into_iter().map(Into::into).collect();
        let mut seen = HashSet::new();
        for item in &items {
            if let Some(alias) = item.effective_alias() {
                if !seen.insert(alias.to_string()) {
                    return Err(CriteriaError::argument(format!(
                        "alias '{alias}' used more than once"
                    )));
                }
            }
        }
        self.selection = items;
        Ok(self)
    }

    pub fn select(&mut self, item: impl Into<SelectItem>) -> &mut Self {
        self.selection = vec![item.into()];
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Set the restriction, replacing an earlier one.
    pub fn where_(&mut self, predicate: Predicate) -> &mut Self {
        self.restriction = Some(predicate);
        self
    }

    /// AND `predicate` onto the current restriction.
    pub fn and_where(&mut self, predicate: Predicate) -> &mut Self {
        self.restriction = Some(match self.restriction.take() {
            Some(existing) => Predicate::And(Box::new(existing), Box::new(predicate)),
            None => predicate,
        });
        self
    }

    pub fn restriction(&self) -> Option<&Predicate> {
        self.restriction.as_ref()
    }

    /// Replace the grouping; an empty list removes it.
    pub fn group_by<I>(&mut self, expressions: I) -> &mut Self
    where
        I: IntoIterator<Item = Expression>,
    {
        self.group_by = expressions.into_iter().collect();
        self
    }

    pub fn group_list(&self) -> &[Expression] {
        &self.group_by
    }

    pub fn having(&mut self, predicate: Predicate) -> &mut Self {
        self.having = Some(predicate);
        self
    }

    pub fn group_restriction(&self) -> Option<&Predicate> {
        self.having.as_ref()
    }

    /// Replace the ordering; an empty list removes it.
    pub fn order_by<I>(&mut self, orders: I) -> &mut Self
    where
        I: IntoIterator<Item = Order>,
    {
        self.order_by = orders.into_iter().collect();
        self
    }

    pub fn order_list(&self) -> &[Order] {
        &self.order_by
    }

    pub fn limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit;
        self
    }

    pub fn offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.offset = offset;
        self
    }

    pub fn selection(&self) -> &[SelectItem] {
        &self.selection
    }

    pub fn tuple_elements(&self) -> Arc<[TupleElement]> {
        self.selection
            .iter()
            .enumerate()
            .map(|(position, item)| TupleElement {
                alias: item.effective_alias().map(str::to_string),
                kind: item.expression.kind(),
                position,
            })
            .collect()
    }

    /// Render with the builder's bind values and processor. Rendering does
    /// not change the builder, so a query can be rendered repeatedly.
    pub fn to_statement(&self, cb: &CriteriaBuilder) -> CriteriaResult<Statement> {
        let mut parameters = cb.parameters().clone();
        let processor = cb.processor().clone();
        let mut w = SqlWriter::new(&mut parameters, processor.as_ref());
        self.as_sql(&mut w)?;
        let sql = w.finish();
        tracing::trace!(%sql, binds = parameters.len(), "rendered criteria query");
        Ok(Statement {
            sql,
            parameters: parameters.values().to_vec(),
            elements: self.tuple_elements(),
        })
    }
}

impl SqlConvertible for CriteriaQuery {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        if self.selection.is_empty() {
            return Err(CriteriaError::state("query without selection"));
        }
        if self.roots.is_empty() {
            return Err(CriteriaError::state("query without FROM clause"));
        }
        w.push("SELECT ");
        if self.distinct {
            w.push("DISTINCT ");
        }
        for (i, item) in self.selection.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            item.expression.as_sql(w)?;
        }
        w.push(" FROM ");
        w.render_list(&self.roots, ", ")?;

        let discriminators = root_discriminators(&self.roots);
        let mut parts: Vec<&dyn SqlConvertible> = Vec::with_capacity(discriminators.len() + 1);
        if let Some(restriction) = &self.restriction {
            parts.push(restriction);
        }
        parts.extend(discriminators.iter().map(|d| d as &dyn SqlConvertible));
        if !parts.is_empty() {
            w.push(" WHERE ");
            render_conjunction(w, &parts)?;
        }
        if !self.group_by.is_empty() {
            w.push(" GROUP BY ");
            w.render_list(&self.group_by, ", ")?;
        }
        if let Some(having) = &self.having {
            w.push(" HAVING ");
            having.as_sql(w)?;
        }
        if !self.order_by.is_empty() {
            w.push(" ORDER BY ");
            w.render_list(&self.order_by, ", ")?;
        }
        let tail = w.processor().limit_offset(self.limit, self.offset);
        w.push(&tail);
        Ok(())
    }
}
