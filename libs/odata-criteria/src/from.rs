//! FROM clause: roots and the join tree hanging off them.

use std::sync::Arc;

use odata_core::ast::Value;

use crate::builder::CriteriaBuilder;
use crate::error::{CriteriaError, CriteriaResult};
use crate::expression::{Expression, PathExpr};
use crate::metadata::{AttributePath, CollectionAttribute, EntityType, FieldKind};
use crate::predicate::{ComparisonOperator, Predicate};
use crate::writer::{SqlConvertible, SqlWriter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
}

impl JoinType {
    pub fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT OUTER JOIN",
            JoinType::Right => "RIGHT OUTER JOIN",
        }
    }
}

/// Handle of a root or join; used to address its columns.
#[derive(Clone, Debug)]
pub struct FromRef {
    alias: String,
    entity: Arc<EntityType>,
    collection: Option<Arc<CollectionAttribute>>,
}

impl FromRef {
    pub(crate) fn entity_source(alias: String, entity: Arc<EntityType>) -> Self {
        Self {
            alias,
            entity,
            collection: None,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    /// The collection attribute this join reads, if it is a collection join.
    pub fn collection(&self) -> Option<&CollectionAttribute> {
        self.collection.as_deref()
    }

    fn to_expression(&self, p: &AttributePath) -> Expression {
        Expression::Path(PathExpr {
            table_alias: self.alias.clone(),
            column: p.column.clone(),
            alias: p.alias.clone(),
            internal: p.internal.clone(),
            kind: p.kind,
        })
    }

    /// Column expression of an attribute path (external or internal name).
    pub fn get(&self, name: &str) -> CriteriaResult<Expression> {
        if let Some(collection) = &self.collection {
            if let Some(p) = collection.path_list().iter().find(|p| p.matches(name)) {
                return Ok(self.to_expression(p));
            }
        }
        self.entity.path(name).map(|p| self.to_expression(&p))
    }

    /// Selectable paths; ignored attributes are left out and complex
    /// attributes are flattened.
    pub fn path_list(&self) -> Vec<AttributePath> {
        match &self.collection {
            Some(collection) => collection.path_list(),
            None => self
                .entity
                .path_list()
                .into_iter()
                .filter(|p| !p.ignore)
                .collect(),
        }
    }

    pub fn resolve_path_elements(&self) -> Vec<Expression> {
        self.path_list()
            .iter()
            .map(|p| self.to_expression(p))
            .collect()
    }

    pub fn key(&self) -> CriteriaResult<Vec<Expression>> {
        Ok(self
            .entity
            .key_paths()?
            .iter()
            .map(|p| self.to_expression(p))
            .collect())
    }
}

/// `(alias."column" = ?n)` added while rendering, so the bind position
/// follows all values created before.
pub(crate) struct DiscriminatorCheck<'a> {
    alias: &'a str,
    column: &'a str,
    value: &'a Value,
}

impl SqlConvertible for DiscriminatorCheck<'_> {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        w.push("(")
            .push_column(self.alias, self.column)
            .push(" = ")
            .bind(self.value.clone())
            .push(")");
        Ok(())
    }
}

impl<'a> DiscriminatorCheck<'a> {
    fn of(from: &'a FromRef) -> Option<Self> {
        from.entity.discriminator.as_ref().map(|d| DiscriminatorCheck {
            alias: &from.alias,
            column: &d.column,
            value: &d.value,
        })
    }
}

/// Left-associative AND over already built parts.
pub(crate) fn render_conjunction(
    w: &mut SqlWriter<'_>,
    parts: &[&dyn SqlConvertible],
) -> CriteriaResult<()> {
    for _ in 1..parts.len() {
        w.push("(");
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            w.push(" AND ");
        }
        part.as_sql(w)?;
        if i > 0 {
            w.push(")");
        }
    }
    Ok(())
}

/// Discriminator checks of the roots; rendered into the WHERE clause.
pub(crate) fn root_discriminators(roots: &[RootNode]) -> Vec<DiscriminatorCheck<'_>> {
    roots
        .iter()
        .filter_map(|r| DiscriminatorCheck::of(&r.from))
        .collect()
}

#[derive(Clone, Debug)]
enum JoinTarget {
    Entity,
    CollectionTable {
        schema: Option<String>,
        table: Option<String>,
        attribute: String,
        owner: String,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct JoinNode {
    from: FromRef,
    join_type: JoinType,
    target: JoinTarget,
    on: Predicate,
    joins: Vec<JoinNode>,
}

impl JoinNode {
    pub(crate) fn create(
        cb: &mut CriteriaBuilder,
        parent: &FromRef,
        attribute: &str,
        join_type: JoinType,
    ) -> CriteriaResult<Self> {
        if let Some(association) = parent
            .entity
            .associations
            .iter()
            .find(|a| a.alias == attribute)
        {
            let target = cb.service_document().target_of(association)?;
            let from = FromRef::entity_source(cb.next_alias(), target);
            let mut conditions = Vec::with_capacity(association.join_columns.len());
            for column in &association.join_columns {
                conditions.push(Predicate::Compare(
                    parent.get(&column.left)?,
                    ComparisonOperator::Equal,
                    from.get(&column.right)?,
                ));
            }
            let on = Predicate::conjunction(conditions).ok_or_else(|| {
                CriteriaError::model(format!(
                    "navigation property '{attribute}' of '{}' has no join columns",
                    parent.entity.name
                ))
            })?;
            return Ok(Self {
                from,
                join_type,
                target: JoinTarget::Entity,
                on,
                joins: Vec::new(),
            });
        }

        let collection = parent.entity.collection_attribute(attribute).ok_or_else(|| {
            CriteriaError::model(format!(
                "'{attribute}' is neither a navigation nor a collection property of '{}'",
                parent.entity.name
            ))
        })?;
        let join_table = &collection.join_table;
        let entity = match &join_table.entity_type {
            Some(name) => cb.service_document().entity_type(name)?,
            None => parent.entity.clone(),
        };
        let from = FromRef {
            alias: cb.next_alias(),
            entity,
            collection: Some(Arc::new(collection.clone())),
        };
        let mut conditions = Vec::with_capacity(join_table.join_columns.len());
        for column in &join_table.join_columns {
            let left = parent.get(&column.left)?;
            let kind = left.kind().unwrap_or(FieldKind::String);
            conditions.push(Predicate::Compare(
                left,
                ComparisonOperator::Equal,
                Expression::Path(PathExpr {
                    table_alias: from.alias.clone(),
                    column: column.right.clone(),
                    alias: column.right.clone(),
                    internal: column.right.clone(),
                    kind,
                }),
            ));
        }
        let on = Predicate::conjunction(conditions).ok_or_else(|| {
            CriteriaError::model(format!(
                "collection property '{attribute}' of '{}' has no join columns",
                parent.entity.name
            ))
        })?;
        Ok(Self {
            from,
            // collection tables are always inner joined
            join_type: JoinType::Inner,
            target: JoinTarget::CollectionTable {
                schema: join_table.schema.clone(),
                table: join_table.table.clone(),
                attribute: collection.name.clone(),
                owner: parent.entity.name.clone(),
            },
            on,
            joins: Vec::new(),
        })
    }

    pub(crate) fn from_ref(&self) -> &FromRef {
        &self.from
    }
}

impl SqlConvertible for JoinNode {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        w.push(" ").push(self.join_type.keyword()).push(" ");
        let discriminator = match &self.target {
            JoinTarget::Entity => {
                w.push_table(self.from.entity.schema.as_deref(), &self.from.entity.table);
                DiscriminatorCheck::of(&self.from)
            }
            JoinTarget::CollectionTable {
                schema,
                table,
                attribute,
                owner,
            } => {
                let table = table.as_deref().ok_or_else(|| {
                    CriteriaError::state(format!(
                        "Target DB table of collection attribute {attribute} of {owner}"
                    ))
                })?;
                w.push_table(schema.as_deref(), table);
                None
            }
        };
        w.push(" ").push(&self.from.alias).push(" ON ");
        match &discriminator {
            Some(d) => {
                let parts: [&dyn SqlConvertible; 2] = [&self.on, d];
                render_conjunction(w, &parts)?
            }
            None => self.on.as_sql(w)?,
        }
        for join in &self.joins {
            join.as_sql(w)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RootNode {
    pub(crate) from: FromRef,
    pub(crate) joins: Vec<JoinNode>,
}

impl RootNode {
    pub(crate) fn new(from: FromRef) -> Self {
        Self {
            from,
            joins: Vec::new(),
        }
    }
}

impl SqlConvertible for RootNode {
    fn as_sql(&self, w: &mut SqlWriter<'_>) -> CriteriaResult<()> {
        w.push_table(self.from.entity.schema.as_deref(), &self.from.entity.table)
            .push(" ")
            .push(&self.from.alias);
        for join in &self.joins {
            join.as_sql(w)?;
        }
        Ok(())
    }
}

/// Join list of the node carrying `alias`, searched depth first.
pub(crate) fn joins_of<'a>(
    roots: &'a mut [RootNode],
    alias: &str,
) -> Option<&'a mut Vec<JoinNode>> {
    for root in roots.iter_mut() {
        if root.from.alias == alias {
            return Some(&mut root.joins);
        }
        if let Some(found) = nested_joins_of(&mut root.joins, alias) {
            return Some(found);
        }
    }
    None
}

fn nested_joins_of<'a>(joins: &'a mut [JoinNode], alias: &str) -> Option<&'a mut Vec<JoinNode>> {
    for join in joins.iter_mut() {
        if join.from.alias == alias {
            return Some(&mut join.joins);
        }
        if let Some(found) = nested_joins_of(&mut join.joins, alias) {
            return Some(found);
        }
    }
    None
}
