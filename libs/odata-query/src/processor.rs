//! Read requests: one query per navigation level, executed top down and
//! assembled into nested entity collections.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use indexmap::IndexMap;
use odata_core::{
    EntityCollection, Error, ExpandItem, ODataOrderBy, ODataQuery, ODataResult, SortDir,
    ROOT_RESULT_KEY,
};
use odata_criteria::{
    AttributePath, CollectionAttribute, CriteriaBuilder, CriteriaQuery, DatabaseProcessor,
    EntityType, FromRef, JoinType, Order, Predicate, SelectItem, ServiceDocument, Statement, Tuple,
    PATH_SEPARATOR,
};

use crate::boundary::KeyBoundary;
use crate::claims::{claims_predicate, ClaimsProvider};
use crate::config::QueryConfig;
use crate::executor::QueryExecutor;
use crate::filter::compile_filter;
use crate::result::{
    group_rows, retain_first_origin, ChildResult, CollectionQueryResult, ExpandQueryResult,
};
use crate::skiptoken::SkipTokenProvider;
use crate::uri::{resolve, Hop, UriPath};

/// Entity collections of one request by result key; the addressed
/// collection is stored under [`ROOT_RESULT_KEY`].
pub type ReadResult = IndexMap<String, EntityCollection>;

const COUNT_ALIAS: &str = "count";

/// Additional restriction supplied by the caller. It is AND-ed into every
/// query, after the claims.
pub trait WhereEnhancement: Send + Sync {
    fn enhance(&self, cb: &mut CriteriaBuilder, target: &FromRef)
        -> ODataResult<Option<Predicate>>;
}

/// Per request collaborators of the processor.
#[derive(Clone, Default)]
pub struct RequestContext {
    pub claims: ClaimsProvider,
    pub skip_tokens: Option<Arc<dyn SkipTokenProvider>>,
    pub enhancement: Option<Arc<dyn WhereEnhancement>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claims(mut self, claims: ClaimsProvider) -> Self {
        self.claims = claims;
        self
    }

    pub fn with_skip_tokens(mut self, provider: Arc<dyn SkipTokenProvider>) -> Self {
        self.skip_tokens = Some(provider);
        self
    }

    pub fn with_enhancement(mut self, enhancement: Arc<dyn WhereEnhancement>) -> Self {
        self.enhancement = Some(enhancement);
        self
    }
}

/// Key window of the addressed collection and the hop it applies to.
type Window<'a> = Option<(usize, &'a KeyBoundary)>;

struct Prepared {
    cb: CriteriaBuilder,
    query: CriteriaQuery,
    refs: Vec<FromRef>,
}

impl Prepared {
    fn target(&self) -> ODataResult<&FromRef> {
        self.refs
            .last()
            .ok_or_else(|| Error::QueryPreparation("query without source".to_string()))
    }
}

/// Requested properties and collection attributes of one level.
struct Selection {
    properties: Vec<AttributePath>,
    collections: Vec<CollectionAttribute>,
}

fn select_paths(entity: &EntityType, query: &ODataQuery) -> ODataResult<Selection> {
    let paths: Vec<AttributePath> = entity.path_list().into_iter().filter(|p| !p.ignore).collect();
    if query.selects_all() {
        return Ok(Selection {
            properties: paths,
            collections: entity.collections.clone(),
        });
    }

    let key = entity.key_paths()?;
    let mut chosen = vec![false; paths.len()];
    let mut collections: Vec<CollectionAttribute> = Vec::new();
    for item in &query.select {
        if let Some(attribute) = entity.collection_attribute(item) {
            if !collections.iter().any(|c| c.name == attribute.name) {
                collections.push(attribute.clone());
            }
            continue;
        }
        let prefix = format!("{item}{PATH_SEPARATOR}");
        let mut found = false;
        for (i, path) in paths.iter().enumerate() {
            if path.matches(item) || path.alias.starts_with(&prefix) || path.internal.starts_with(&prefix)
            {
                chosen[i] = true;
                found = true;
            }
        }
        if !found {
            return Err(Error::InvalidSelect(format!(
                "'{item}' is not a property of '{}'",
                entity.name
            )));
        }
    }
    let properties = paths
        .into_iter()
        .zip(chosen)
        .filter(|(path, chosen)| *chosen || key.iter().any(|k| k.alias == path.alias))
        .map(|(path, _)| path)
        .collect();
    Ok(Selection {
        properties,
        collections,
    })
}

/// Source side join columns of all expanded navigation properties.
fn expand_link_paths(entity: &EntityType, expand: &[ExpandItem]) -> ODataResult<Vec<AttributePath>> {
    let mut out = Vec::new();
    for item in expand {
        let association = entity.association(&item.navigation).map_err(|_| {
            Error::InvalidExpand(format!(
                "'{}' is not a navigation property of '{}'",
                item.navigation, entity.name
            ))
        })?;
        for left in association.left_columns() {
            out.push(entity.path(left)?);
        }
    }
    Ok(out)
}

/// `properties` followed by the `extra` paths they do not contain yet.
fn merge_columns(properties: &[AttributePath], extra: &[AttributePath]) -> Vec<AttributePath> {
    let mut columns = properties.to_vec();
    for path in extra {
        if !columns.iter().any(|c| c.alias == path.alias) {
            columns.push(path.clone());
        }
    }
    columns
}

fn aliased_columns(from: &FromRef, columns: &[AttributePath]) -> ODataResult<Vec<SelectItem>> {
    columns
        .iter()
        .map(|p| Ok(SelectItem::aliased(from.get(&p.alias)?, p.alias.clone())))
        .collect()
}

/// Key columns of the rows above a child level. Key columns of the last
/// ancestor that are already selected as `linked` keep that alias; the rest
/// are selected as `{prefix}#{level}.{key}`.
fn origin_columns(
    ancestors: &[FromRef],
    linked: &[(&AttributePath, &String)],
    prefix: &str,
) -> ODataResult<(Vec<SelectItem>, Vec<String>)> {
    let mut items = Vec::new();
    let mut aliases = Vec::new();
    for (level, from) in ancestors.iter().enumerate() {
        let last = level + 1 == ancestors.len();
        for path in from.entity().key_paths()? {
            let reused = linked
                .iter()
                .find(|(link, _)| last && link.alias == path.alias)
                .map(|(_, alias)| (*alias).clone());
            match reused {
                Some(alias) => aliases.push(alias),
                None => {
                    let alias = format!("{prefix}#{level}.{}", path.alias);
                    items.push(SelectItem::aliased(from.get(&path.alias)?, alias.clone()));
                    aliases.push(alias);
                }
            }
        }
    }
    Ok((items, aliases))
}

/// `$orderby` on `from` followed by the key as tiebreaker.
fn ordering(
    cb: &CriteriaBuilder,
    from: &FromRef,
    order: &ODataOrderBy,
    key: &[AttributePath],
) -> ODataResult<Vec<Order>> {
    let entity = from.entity();
    let mut orders = Vec::with_capacity(order.0.len() + key.len());
    let mut used: Vec<String> = Vec::new();
    for item in &order.0 {
        let path = entity
            .path(&item.field)
            .ok()
            .filter(|p| !p.ignore)
            .ok_or_else(|| {
                Error::InvalidOrderByField(format!(
                    "'{}' is not a property of '{}'",
                    item.field, entity.name
                ))
            })?;
        let column = from.get(&path.alias)?;
        orders.push(match item.dir {
            SortDir::Asc => cb.asc(column),
            SortDir::Desc => cb.desc(column),
        });
        used.push(path.alias);
    }
    for path in key {
        if !used.contains(&path.alias) {
            orders.push(cb.asc(from.get(&path.alias)?));
        }
    }
    Ok(orders)
}

fn count_value(row: &Tuple) -> ODataResult<u64> {
    let count: i64 = row.get_by_alias_as(COUNT_ALIAS)?;
    u64::try_from(count)
        .map_err(|_| Error::QueryPreparation(format!("negative row count {count}")))
}

/// Skip and top applied to every group on its own.
fn page_groups(
    groups: IndexMap<String, Vec<Tuple>>,
    skip: Option<u64>,
    top: Option<u64>,
) -> IndexMap<String, Vec<Tuple>> {
    if skip.is_none() && top.is_none() {
        return groups;
    }
    let skip = skip.map_or(0, |s| usize::try_from(s).unwrap_or(usize::MAX));
    let top = top.map_or(usize::MAX, |t| usize::try_from(t).unwrap_or(usize::MAX));
    groups
        .into_iter()
        .map(|(key, rows)| (key, rows.into_iter().skip(skip).take(top).collect()))
        .collect()
}

struct CollectionStatement {
    statement: Statement,
    /// Owner key aliases.
    group: Vec<String>,
    origin: Vec<String>,
    element: Vec<AttributePath>,
}

/// Executes read requests against one service document.
pub struct RequestProcessor {
    sd: Arc<ServiceDocument>,
    processor: Arc<dyn DatabaseProcessor>,
    executor: Arc<dyn QueryExecutor>,
    config: QueryConfig,
}

impl RequestProcessor {
    pub fn new(
        sd: Arc<ServiceDocument>,
        processor: Arc<dyn DatabaseProcessor>,
        executor: Arc<dyn QueryExecutor>,
        config: QueryConfig,
    ) -> Self {
        Self {
            sd,
            processor,
            executor,
            config,
        }
    }

    pub fn service_document(&self) -> &Arc<ServiceDocument> {
        &self.sd
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Read the collection addressed by `path` with `query` applied.
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(
            resource = path.segments.first().map(|s| s.name.as_str()).unwrap_or_default(),
            expand = query.expand.len()
        )
    )]
    pub async fn read(
        &self,
        path: &UriPath,
        query: &ODataQuery,
        ctx: &RequestContext,
    ) -> ODataResult<ReadResult> {
        let mut hops = resolve(&self.sd, path)?;
        let target_index = hops.len().saturating_sub(1);
        let entity = {
            let target = hops
                .last_mut()
                .ok_or_else(|| Error::UnknownResource("empty resource path".to_string()))?;
            target.filter = query.filter.clone();
            target.entity.clone()
        };

        let selection = select_paths(&entity, query)?;
        let key = entity.key_paths()?;
        let columns = merge_columns(
            &selection.properties,
            &expand_link_paths(&entity, &query.expand)?,
        );
        let top = self.config.clamp_top(query.top);

        let statement = self.root_statement(&hops, &columns, query, top, ctx)?;
        let rows = self.fetch(&statement).await?;
        tracing::debug!(entity = %entity.name, rows = rows.len(), "read top level rows");

        let boundary = if !rows.is_empty()
            && (query.has_expand() || !selection.collections.is_empty())
            && (top.is_some() || query.skip.is_some())
        {
            KeyBoundary::from_rows(&rows, &key)?
        } else {
            None
        };
        let window = boundary.as_ref().map(|b| (target_index, b));

        let mut root = ExpandQueryResult::root(entity.clone(), selection.properties, &key, rows);
        if query.count {
            let statement = self.root_count_statement(&hops, ctx)?;
            let rows = self.fetch(&statement).await?;
            let count = match rows.first() {
                Some(row) => count_value(row)?,
                None => 0,
            };
            root = root.with_counts(HashMap::from([(ROOT_RESULT_KEY.to_string(), count)]));
        }

        self.read_collections(&mut root, &hops, window, &selection.collections, ctx)
            .await?;
        for item in &query.expand {
            let child = self
                .read_expand(hops.clone(), entity.clone(), item, window, ctx)
                .await?;
            root.put_child(item.navigation.clone(), ChildResult::Expand(child))?;
        }

        let collection = root.assemble(ROOT_RESULT_KEY, &mut Vec::new(), ctx.skip_tokens.as_deref())?;
        let mut result = ReadResult::new();
        result.insert(ROOT_RESULT_KEY.to_string(), collection);
        Ok(result)
    }

    async fn fetch(&self, statement: &Statement) -> ODataResult<Vec<Tuple>> {
        tracing::debug!(sql = %statement.sql, binds = statement.parameters.len(), "executing query");
        self.executor.fetch(statement).await
    }

    /// FROM and joins along `hops` with the WHERE clause composed of key
    /// predicates, the key window, hop filters, claims and the caller's
    /// enhancement, in this order.
    fn prepare(&self, hops: &[Hop], window: Window<'_>, ctx: &RequestContext) -> ODataResult<Prepared> {
        let mut cb = CriteriaBuilder::new(self.sd.clone(), self.processor.clone());
        let mut query = cb.create_query();
        let (first, rest) = hops
            .split_first()
            .ok_or_else(|| Error::QueryPreparation("query without source".to_string()))?;

        let mut refs = Vec::with_capacity(hops.len());
        refs.push(query.from_entity(&mut cb, first.entity.clone()));
        for hop in rest {
            let navigation = hop.navigation.as_deref().ok_or_else(|| {
                Error::QueryPreparation(format!("hop to '{}' without navigation", hop.entity.name))
            })?;
            let parent = &refs[refs.len() - 1];
            let joined = query.join(&mut cb, parent, navigation, JoinType::Inner)?;
            refs.push(joined);
        }

        let mut restrictions = Vec::new();
        for (hop, from) in hops.iter().zip(&refs) {
            for (alias, value) in &hop.keys {
                let column = from.get(alias)?;
                restrictions.push(cb.equal(column, value));
            }
        }
        if let Some((index, boundary)) = window {
            if let Some(from) = refs.get(index) {
                restrictions.push(boundary.to_predicate(&mut cb, from)?);
            }
        }
        for (hop, from) in hops.iter().zip(&refs) {
            if let Some(filter) = &hop.filter {
                restrictions.push(compile_filter(&mut cb, from, filter)?);
            }
        }
        for from in &refs {
            restrictions.extend(claims_predicate(&mut cb, from, &ctx.claims)?);
        }
        if let (Some(enhancement), Some(target)) = (&ctx.enhancement, refs.last()) {
            restrictions.extend(enhancement.enhance(&mut cb, target)?);
        }
        if let Some(restriction) = Predicate::conjunction(restrictions) {
            query.where_(restriction);
        }
        Ok(Prepared { cb, query, refs })
    }

    fn root_statement(
        &self,
        hops: &[Hop],
        columns: &[AttributePath],
        query: &ODataQuery,
        top: Option<u64>,
        ctx: &RequestContext,
    ) -> ODataResult<Statement> {
        let mut prepared = self.prepare(hops, None, ctx)?;
        let target = prepared.target()?.clone();
        let key = target.entity().key_paths()?;
        prepared.query.multiselect(aliased_columns(&target, columns)?)?;
        let orders = ordering(&prepared.cb, &target, &query.order, &key)?;
        prepared
            .query
            .order_by(orders)
            .limit(top)
            .offset(query.skip);
        Ok(prepared.query.to_statement(&prepared.cb)?)
    }

    fn root_count_statement(&self, hops: &[Hop], ctx: &RequestContext) -> ODataResult<Statement> {
        let mut prepared = self.prepare(hops, None, ctx)?;
        let target = prepared.target()?.clone();
        let first_key = target
            .key()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Model(format!("'{}' has no key", target.entity().name)))?;
        let count = prepared.cb.count(first_key);
        prepared.query.select(SelectItem::aliased(count, COUNT_ALIAS));
        Ok(prepared.query.to_statement(&prepared.cb)?)
    }

    /// Query of one expanded navigation property below `parent_hops`,
    /// followed by its collections and nested expands.
    fn read_expand<'a>(
        &'a self,
        parent_hops: Vec<Hop>,
        parent: Arc<EntityType>,
        item: &'a ExpandItem,
        window: Window<'a>,
        ctx: &'a RequestContext,
    ) -> BoxFuture<'a, ODataResult<ExpandQueryResult>> {
        async move {
            let association = parent.association(&item.navigation).map_err(|_| {
                Error::InvalidExpand(format!(
                    "'{}' is not a navigation property of '{}'",
                    item.navigation, parent.name
                ))
            })?;
            let target = self.sd.target_of(association)?;
            let link_paths = association
                .left_columns()
                .map(|left| parent.path(left))
                .collect::<Result<Vec<_>, _>>()?;
            let group_aliases: Vec<String> = link_paths
                .iter()
                .map(|p| format!("{}.{}", item.navigation, p.alias))
                .collect();

            let options = &item.options;
            let mut hops = parent_hops;
            hops.push(Hop::navigate(target.clone(), &item.navigation, options.filter.clone()));

            let selection = select_paths(&target, options)?;
            let key = target.key_paths()?;
            let columns = merge_columns(
                &selection.properties,
                &expand_link_paths(&target, &options.expand)?,
            );

            let (statement, origin) = self.expand_statement(
                &hops,
                window,
                &item.navigation,
                &link_paths,
                &group_aliases,
                &columns,
                options,
                ctx,
            )?;
            let rows = self.fetch(&statement).await?;
            tracing::debug!(
                navigation = %item.navigation,
                rows = rows.len(),
                "read expanded rows"
            );
            let groups = retain_first_origin(group_rows(rows, &group_aliases)?, &origin)?;
            // Counted before paging; the query itself is not paged.
            let counts: Option<HashMap<String, u64>> = options.count.then(|| {
                groups
                    .iter()
                    .map(|(parent_key, rows)| (parent_key.clone(), rows.len() as u64))
                    .collect()
            });
            let groups = page_groups(groups, options.skip, options.top);

            let link = link_paths.iter().map(|p| p.alias.clone()).collect();
            let mut node =
                ExpandQueryResult::new(target.clone(), selection.properties, &key, groups).with_link(link);
            if let Some(counts) = counts {
                node = node.with_counts(counts);
            }

            self.read_collections(&mut node, &hops, window, &selection.collections, ctx)
                .await?;
            for nested in &options.expand {
                let child = self
                    .read_expand(hops.clone(), target.clone(), nested, window, ctx)
                    .await?;
                node.put_child(nested.navigation.clone(), ChildResult::Expand(child))?;
            }
            Ok(node)
        }
        .boxed()
    }

    #[allow(clippy::too_many_arguments)]
    fn expand_statement(
        &self,
        hops: &[Hop],
        window: Window<'_>,
        navigation: &str,
        link_paths: &[AttributePath],
        group_aliases: &[String],
        columns: &[AttributePath],
        options: &ODataQuery,
        ctx: &RequestContext,
    ) -> ODataResult<(Statement, Vec<String>)> {
        let mut prepared = self.prepare(hops, window, ctx)?;
        let (ancestors, target) = match prepared.refs.split_last() {
            Some((target, ancestors)) if !ancestors.is_empty() => (ancestors.to_vec(), target.clone()),
            _ => {
                return Err(Error::QueryPreparation(
                    "expand without parent".to_string(),
                ))
            }
        };
        let parent = &ancestors[ancestors.len() - 1];
        let key = target.entity().key_paths()?;

        let mut items = Vec::with_capacity(link_paths.len() + columns.len());
        let mut orders = Vec::with_capacity(link_paths.len());
        for (path, alias) in link_paths.iter().zip(group_aliases) {
            let column = parent.get(&path.alias)?;
            orders.push(prepared.cb.asc(column.clone()));
            items.push(SelectItem::aliased(column, alias.clone()));
        }
        items.extend(aliased_columns(&target, columns)?);
        orders.extend(ordering(&prepared.cb, &target, &options.order, &key)?);

        let linked: Vec<_> = link_paths.iter().zip(group_aliases).collect();
        let (origin_items, origin) = origin_columns(&ancestors, &linked, navigation)?;
        items.extend(origin_items);

        prepared.query.multiselect(items)?;
        prepared.query.order_by(orders);
        Ok((prepared.query.to_statement(&prepared.cb)?, origin))
    }

    /// One query per requested collection attribute of the level `hops`
    /// ends in; results are registered under the attribute's external name.
    async fn read_collections(
        &self,
        node: &mut ExpandQueryResult,
        hops: &[Hop],
        window: Window<'_>,
        collections: &[CollectionAttribute],
        ctx: &RequestContext,
    ) -> ODataResult<()> {
        for attribute in collections {
            let CollectionStatement {
                statement,
                group,
                origin,
                element,
            } = self.collection_statement(hops, window, attribute, ctx)?;
            let rows = self.fetch(&statement).await?;
            tracing::debug!(
                collection = %attribute.external_name,
                rows = rows.len(),
                "read collection property rows"
            );
            let result = CollectionQueryResult::new(
                element,
                attribute.is_complex(),
                retain_first_origin(group_rows(rows, &group)?, &origin)?,
            );
            node.put_child(attribute.external_name.clone(), ChildResult::Collection(result))?;
        }
        Ok(())
    }

    fn collection_statement(
        &self,
        hops: &[Hop],
        window: Window<'_>,
        attribute: &CollectionAttribute,
        ctx: &RequestContext,
    ) -> ODataResult<CollectionStatement> {
        let mut prepared = self.prepare(hops, window, ctx)?;
        let (owner, ancestors) = match prepared.refs.split_last() {
            Some((owner, ancestors)) => (owner.clone(), ancestors.to_vec()),
            None => return Err(Error::QueryPreparation("collection without owner".to_string())),
        };
        let collection = prepared
            .query
            .join(&mut prepared.cb, &owner, &attribute.name, JoinType::Inner)?;

        let key = owner.entity().key_paths()?;
        let aliases: Vec<String> = key
            .iter()
            .map(|p| format!("{}.{}", attribute.external_name, p.alias))
            .collect();
        let element = collection.path_list();

        let mut items = Vec::with_capacity(key.len() + element.len());
        let mut orders = Vec::with_capacity(key.len());
        for (path, alias) in key.iter().zip(&aliases) {
            let column = owner.get(&path.alias)?;
            orders.push(prepared.cb.asc(column.clone()));
            items.push(SelectItem::aliased(column, alias.clone()));
        }
        items.extend(aliased_columns(&collection, &element)?);
        let (origin_items, origin) = origin_columns(&ancestors, &[], &attribute.external_name)?;
        items.extend(origin_items);

        prepared.query.multiselect(items)?;
        prepared.query.order_by(orders);
        Ok(CollectionStatement {
            statement: prepared.query.to_statement(&prepared.cb)?,
            group: aliases,
            origin,
            element,
        })
    }
}
