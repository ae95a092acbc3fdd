//! Tuple results of one request, one node per query level, and their
//! conversion into entity collections.
//!
//! Rows of a node are grouped by parent key: the values of the join
//! columns that link a child row to its parent row, concatenated with
//! [`KEY_SEPARATOR`]. Top level rows are grouped under
//! [`ROOT_RESULT_KEY`].
//!
//! Conversion consumes the rows. It happens once per node and is cached;
//! collection property children are converted together with their parent,
//! expand children when the parent is assembled.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use odata_core::ast::Value;
use odata_core::{Entity, EntityCollection, Error, ODataResult, PropertyValue, ROOT_RESULT_KEY};
use odata_criteria::{AttributePath, EntityType, Tuple, PATH_SEPARATOR};

use crate::skiptoken::{token_to_string, PageExpandInfo, SkipTokenProvider};

pub const KEY_SEPARATOR: char = '/';

const ESCAPE: char = '\\';
const NULL_MARKER: &str = "\\N";

/// Parent key string of a value tuple. Separators and escape characters
/// inside values are escaped, so different tuples never share a key.
pub fn key_string<'a>(values: impl IntoIterator<Item = &'a Value>) -> String {
    let mut out = String::new();
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            out.push(KEY_SEPARATOR);
        }
        if value.is_null() {
            out.push_str(NULL_MARKER);
            continue;
        }
        for ch in value.to_string().chars() {
            if ch == ESCAPE || ch == KEY_SEPARATOR {
                out.push(ESCAPE);
            }
            out.push(ch);
        }
    }
    out
}

pub fn row_key(row: &Tuple, aliases: &[String]) -> ODataResult<String> {
    let values = aliases
        .iter()
        .map(|a| row.get_by_alias(a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(key_string(values))
}

/// Group rows by the key formed from `aliases`, keeping row order.
pub fn group_rows(
    rows: Vec<Tuple>,
    aliases: &[String],
) -> ODataResult<IndexMap<String, Vec<Tuple>>> {
    let mut groups: IndexMap<String, Vec<Tuple>> = IndexMap::new();
    for row in rows {
        let key = row_key(&row, aliases)?;
        groups.entry(key).or_default().push(row);
    }
    Ok(groups)
}

/// Per group, keep only the rows reached through the first origin seen.
/// `origin` names the key columns of the rows above the group; a join
/// through a many-to-one hop repeats the same child rows for every origin
/// sharing the group key.
pub fn retain_first_origin(
    groups: IndexMap<String, Vec<Tuple>>,
    origin: &[String],
) -> ODataResult<IndexMap<String, Vec<Tuple>>> {
    if origin.is_empty() {
        return Ok(groups);
    }
    groups
        .into_iter()
        .map(|(key, rows)| {
            let mut first: Option<String> = None;
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                let from = row_key(&row, origin)?;
                match &first {
                    None => {
                        first = Some(from);
                        kept.push(row);
                    }
                    Some(seen) if *seen == from => kept.push(row),
                    Some(_) => {}
                }
            }
            Ok((key, kept))
        })
        .collect()
}

fn insert_path(map: &mut IndexMap<String, PropertyValue>, path: &str, value: Value) {
    match path.split_once(PATH_SEPARATOR) {
        None => {
            map.insert(path.to_string(), PropertyValue::Primitive(value));
        }
        Some((head, rest)) => {
            let entry = map
                .entry(head.to_string())
                .or_insert_with(|| PropertyValue::Complex(IndexMap::new()));
            if let PropertyValue::Complex(inner) = entry {
                insert_path(inner, rest, value);
            }
        }
    }
}

fn properties_of(row: &Tuple, paths: &[AttributePath]) -> ODataResult<IndexMap<String, PropertyValue>> {
    let mut properties = IndexMap::with_capacity(paths.len());
    for path in paths {
        insert_path(
            &mut properties,
            &path.alias,
            row.get_by_alias(&path.alias)?.clone(),
        );
    }
    Ok(properties)
}

#[derive(Clone, Debug)]
pub enum ConversionState<T> {
    Unconverted,
    Converted(T),
}

impl<T> ConversionState<T> {
    pub fn is_converted(&self) -> bool {
        matches!(self, ConversionState::Converted(_))
    }

    fn get(&self) -> ODataResult<&T> {
        match self {
            ConversionState::Converted(value) => Ok(value),
            ConversionState::Unconverted => Err(Error::QueryPreparation(
                "result accessed before conversion".to_string(),
            )),
        }
    }
}

/// Entity converted from one row, with the parent keys its expanded
/// collections are registered under.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConvertedEntity {
    pub properties: IndexMap<String, PropertyValue>,
    /// Navigation property → key of this entity in that child result.
    pub links: IndexMap<String, String>,
}

/// Rows of one collection property, grouped by owner key.
#[derive(Debug)]
pub struct CollectionQueryResult {
    element: Vec<AttributePath>,
    complex: bool,
    rows: IndexMap<String, Vec<Tuple>>,
    state: ConversionState<IndexMap<String, Vec<PropertyValue>>>,
}

impl CollectionQueryResult {
    pub fn new(element: Vec<AttributePath>, complex: bool, rows: IndexMap<String, Vec<Tuple>>) -> Self {
        Self {
            element,
            complex,
            rows,
            state: ConversionState::Unconverted,
        }
    }

    pub fn rows(&self) -> &IndexMap<String, Vec<Tuple>> {
        &self.rows
    }

    pub fn is_converted(&self) -> bool {
        self.state.is_converted()
    }

    pub fn converted(&mut self) -> ODataResult<&IndexMap<String, Vec<PropertyValue>>> {
        if !self.state.is_converted() {
            let rows = std::mem::take(&mut self.rows);
            let mut out = IndexMap::with_capacity(rows.len());
            for (key, tuples) in rows {
                let mut values = Vec::with_capacity(tuples.len());
                for row in &tuples {
                    values.push(if self.complex {
                        PropertyValue::Complex(properties_of(row, &self.element)?)
                    } else {
                        let path = self.element.first().ok_or_else(|| {
                            Error::Model("collection property without element".to_string())
                        })?;
                        PropertyValue::Primitive(row.get_by_alias(&path.alias)?.clone())
                    });
                }
                out.insert(key, values);
            }
            self.state = ConversionState::Converted(out);
        }
        self.state.get()
    }
}

#[derive(Debug)]
pub enum ChildResult {
    Expand(ExpandQueryResult),
    Collection(CollectionQueryResult),
}

/// Rows of one query level plus the results of the levels below it.
#[derive(Debug)]
pub struct ExpandQueryResult {
    entity: Arc<EntityType>,
    properties: Vec<AttributePath>,
    key: Vec<String>,
    /// Parent side aliases forming the group key of this node's rows.
    link: Vec<String>,
    rows: IndexMap<String, Vec<Tuple>>,
    counts: Option<HashMap<String, u64>>,
    children: IndexMap<String, ChildResult>,
    state: ConversionState<IndexMap<String, Vec<ConvertedEntity>>>,
}

impl ExpandQueryResult {
    pub fn new(
        entity: Arc<EntityType>,
        properties: Vec<AttributePath>,
        key: &[AttributePath],
        rows: IndexMap<String, Vec<Tuple>>,
    ) -> Self {
        Self {
            entity,
            properties,
            key: key.iter().map(|p| p.alias.clone()).collect(),
            link: Vec::new(),
            rows,
            counts: None,
            children: IndexMap::new(),
            state: ConversionState::Unconverted,
        }
    }

    /// Top level result: all rows in the [`ROOT_RESULT_KEY`] group.
    pub fn root(
        entity: Arc<EntityType>,
        properties: Vec<AttributePath>,
        key: &[AttributePath],
        rows: Vec<Tuple>,
    ) -> Self {
        let mut groups = IndexMap::new();
        groups.insert(ROOT_RESULT_KEY.to_string(), rows);
        Self::new(entity, properties, key, groups)
    }

    pub fn with_link(mut self, link: Vec<String>) -> Self {
        self.link = link;
        self
    }

    pub fn with_counts(mut self, counts: HashMap<String, u64>) -> Self {
        self.counts = Some(counts);
        self
    }

    pub fn entity(&self) -> &Arc<EntityType> {
        &self.entity
    }

    pub fn rows(&self) -> &IndexMap<String, Vec<Tuple>> {
        &self.rows
    }

    pub fn counts(&self) -> Option<&HashMap<String, u64>> {
        self.counts.as_ref()
    }

    pub fn child(&self, name: &str) -> Option<&ChildResult> {
        self.children.get(name)
    }

    pub fn is_converted(&self) -> bool {
        self.state.is_converted()
    }

    /// Register the result of a navigation or collection property; a
    /// second registration under the same name is an internal error.
    pub fn put_child(&mut self, name: impl Into<String>, child: ChildResult) -> ODataResult<()> {
        let name = name.into();
        if self.children.contains_key(&name) {
            return Err(Error::DuplicateExpandResult(format!(
                "{} of {}",
                name, self.entity.name
            )));
        }
        self.children.insert(name, child);
        Ok(())
    }

    /// Convert once and return the cached entities by group key.
    pub fn converted(&mut self) -> ODataResult<&IndexMap<String, Vec<ConvertedEntity>>> {
        if !self.state.is_converted() {
            let converted = self.convert()?;
            self.state = ConversionState::Converted(converted);
        }
        self.state.get()
    }

    fn convert(&mut self) -> ODataResult<IndexMap<String, Vec<ConvertedEntity>>> {
        let Self {
            properties: paths,
            key,
            rows,
            children,
            ..
        } = self;

        let mut collections = Vec::new();
        let mut links = Vec::new();
        for (name, child) in children.iter_mut() {
            match child {
                ChildResult::Collection(c) => collections.push((name.as_str(), c.converted()?)),
                ChildResult::Expand(e) => links.push((name.as_str(), e.link.as_slice())),
            }
        }

        let rows = std::mem::take(rows);
        let mut out = IndexMap::with_capacity(rows.len());
        for (group, tuples) in rows {
            let mut entities = Vec::with_capacity(tuples.len());
            for row in &tuples {
                let mut properties = properties_of(row, paths)?;
                if !collections.is_empty() {
                    let own_key = row_key(row, key)?;
                    for (name, values) in &collections {
                        let values = values.get(&own_key).cloned().unwrap_or_default();
                        properties.insert(name.to_string(), PropertyValue::Collection(values));
                    }
                }
                let mut entity_links = IndexMap::with_capacity(links.len());
                for (name, link) in &links {
                    entity_links.insert(name.to_string(), row_key(row, link)?);
                }
                entities.push(ConvertedEntity {
                    properties,
                    links: entity_links,
                });
            }
            out.insert(group, entities);
        }
        tracing::trace!(entity = %self.entity.name, groups = out.len(), "converted query result");
        Ok(out)
    }

    /// Entity collection of group `key`, expanded children attached.
    /// `stack` is the expand path leading here; skip tokens are requested
    /// for it.
    pub fn assemble(
        &mut self,
        key: &str,
        stack: &mut Vec<PageExpandInfo>,
        tokens: Option<&dyn SkipTokenProvider>,
    ) -> ODataResult<EntityCollection> {
        self.converted()?;
        let Self {
            state,
            children,
            counts,
            ..
        } = self;
        let converted = state.get()?;

        let mut collection = EntityCollection::default();
        if let Some(entities) = converted.get(key) {
            collection.entities.reserve(entities.len());
            for converted_entity in entities {
                let mut entity = Entity {
                    properties: converted_entity.properties.clone(),
                    navigation: IndexMap::new(),
                };
                for (navigation, nav_key) in &converted_entity.links {
                    let Some(ChildResult::Expand(child)) = children.get_mut(navigation) else {
                        continue;
                    };
                    stack.push(PageExpandInfo::new(navigation, nav_key));
                    let nested = child.assemble(nav_key, stack, tokens);
                    stack.pop();
                    entity.navigation.insert(navigation.clone(), nested?);
                }
                collection.entities.push(entity);
            }
        }
        collection.count = counts
            .as_ref()
            .map(|c| c.get(key).copied().unwrap_or(0));
        collection.skip_token = tokens
            .and_then(|t| t.get(stack))
            .map(token_to_string);
        Ok(collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odata_criteria::{testing, TupleElement};

    fn tuple(columns: &[(&str, Value)]) -> Tuple {
        let elements: Arc<[TupleElement]> = columns
            .iter()
            .enumerate()
            .map(|(position, (alias, _))| TupleElement {
                alias: Some(alias.to_string()),
                kind: None,
                position,
            })
            .collect();
        Tuple::new(elements, columns.iter().map(|(_, v)| v.clone()).collect()).unwrap()
    }

    fn partner_paths() -> (Arc<EntityType>, Vec<AttributePath>, Vec<AttributePath>) {
        let et = Arc::new(testing::business_partner());
        let props = vec![et.path("ID").unwrap(), et.path("Address/CityName").unwrap()];
        let key = et.key_paths().unwrap();
        (et, props, key)
    }

    #[test]
    fn key_strings_do_not_collide() {
        let a = key_string(&[Value::from("a/b"), Value::from("c")]);
        let b = key_string(&[Value::from("a"), Value::from("b/c")]);
        assert_ne!(a, b);
        let c = key_string(&[Value::from("a\\"), Value::from("b")]);
        let d = key_string(&[Value::from("a"), Value::from("\\b")]);
        assert_ne!(c, d);
        assert_ne!(key_string(&[Value::Null]), key_string(&[Value::from("null")]));
        assert_eq!(key_string(&[Value::from("1"), Value::from(2)]), "1/2");
    }

    #[test]
    fn rows_repeated_for_other_origins_are_dropped() {
        let role = |origin: &str, org: &str| {
            tuple(&[
                ("Organization.BusinessPartnerID", Value::from(org)),
                ("Organization#0.RoleCategory", Value::from(origin)),
                ("ID", Value::from(org)),
            ])
        };
        let rows = vec![role("A", "1"), role("B", "1"), role("A", "2")];
        let origin = vec![
            "Organization.BusinessPartnerID".to_string(),
            "Organization#0.RoleCategory".to_string(),
        ];
        let groups = group_rows(rows, &origin[..1]).unwrap();
        let groups = retain_first_origin(groups, &origin).unwrap();
        assert_eq!(groups["1"].len(), 1);
        assert_eq!(
            groups["1"][0].get_by_alias("Organization#0.RoleCategory").unwrap(),
            &Value::from("A")
        );
        assert_eq!(groups["2"].len(), 1);

        let untouched = group_rows(vec![role("A", "1"), role("B", "1")], &origin[..1]).unwrap();
        assert_eq!(retain_first_origin(untouched, &[]).unwrap()["1"].len(), 2);
    }

    #[test]
    fn duplicate_child_is_an_internal_error() {
        let (et, props, key) = partner_paths();
        let mut root = ExpandQueryResult::root(et.clone(), props.clone(), &key, Vec::new());
        let child = || ExpandQueryResult::new(et.clone(), props.clone(), &key, IndexMap::new());
        root.put_child("Roles", ChildResult::Expand(child())).unwrap();
        let err = root
            .put_child("Roles", ChildResult::Expand(child()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateExpandResult(_)));
        assert_eq!(err.status().as_u16(), 500);
    }

    #[test]
    fn conversion_consumes_rows_once() {
        let (et, props, key) = partner_paths();
        let rows = vec![tuple(&[
            ("ID", Value::from("1")),
            ("Address/CityName", Value::from("Berlin")),
        ])];
        let mut root = ExpandQueryResult::root(et, props, &key, rows);
        assert!(!root.is_converted());

        let first = root.converted().unwrap().clone();
        assert!(root.is_converted());
        assert!(root.rows().is_empty());
        let second = root.converted().unwrap();
        assert_eq!(&first, second);

        let entity = &first[ROOT_RESULT_KEY][0];
        assert_eq!(
            entity.properties["Address"],
            PropertyValue::Complex(IndexMap::from([(
                "CityName".to_string(),
                PropertyValue::Primitive(Value::from("Berlin"))
            )]))
        );
    }

    #[test]
    fn collection_children_convert_with_the_parent() {
        let (et, props, key) = partner_paths();
        let rows = vec![
            tuple(&[("ID", Value::from("1")), ("Address/CityName", Value::Null)]),
            tuple(&[("ID", Value::from("2")), ("Address/CityName", Value::Null)]),
        ];
        let mut root = ExpandQueryResult::root(et, props, &key, rows);

        let comment = testing::organization().collections[0].path_list();
        let mut groups = IndexMap::new();
        groups.insert(
            "1".to_string(),
            vec![
                tuple(&[("Comment.ID", Value::from("1")), ("Comment", Value::from("a"))]),
                tuple(&[("Comment.ID", Value::from("1")), ("Comment", Value::from("b"))]),
            ],
        );
        root.put_child(
            "Comment",
            ChildResult::Collection(CollectionQueryResult::new(comment, false, groups)),
        )
        .unwrap();

        let converted = root.converted().unwrap().clone();
        let entities = &converted[ROOT_RESULT_KEY];
        assert_eq!(
            entities[0].properties["Comment"],
            PropertyValue::Collection(vec![
                PropertyValue::Primitive(Value::from("a")),
                PropertyValue::Primitive(Value::from("b")),
            ])
        );
        assert_eq!(
            entities[1].properties["Comment"],
            PropertyValue::Collection(Vec::new())
        );
        match root.child("Comment") {
            Some(ChildResult::Collection(c)) => {
                assert!(c.is_converted());
                assert!(c.rows().is_empty());
            }
            other => panic!("unexpected child {other:?}"),
        }
    }

    #[test]
    fn expand_children_are_assembled_by_parent_key_with_counts() {
        let (et, props, key) = partner_paths();
        let rows = vec![
            tuple(&[("ID", Value::from("1")), ("Address/CityName", Value::Null)]),
            tuple(&[("ID", Value::from("2")), ("Address/CityName", Value::Null)]),
        ];
        let mut root = ExpandQueryResult::root(et, props, &key, rows);

        let role = Arc::new(testing::business_partner_role());
        let role_props = role.path_list();
        let role_key = role.key_paths().unwrap();
        let child_rows = vec![tuple(&[
            ("Roles.ID", Value::from("1")),
            ("BusinessPartnerID", Value::from("1")),
            ("RoleCategory", Value::from("A")),
        ])];
        let grouped = group_rows(child_rows, &["Roles.ID".to_string()]).unwrap();
        let child = ExpandQueryResult::new(role, role_props, &role_key, grouped)
            .with_link(vec!["ID".to_string()])
            .with_counts(HashMap::from([("1".to_string(), 1)]));
        root.put_child("Roles", ChildResult::Expand(child)).unwrap();

        let collection = root.assemble(ROOT_RESULT_KEY, &mut Vec::new(), None).unwrap();
        assert_eq!(collection.count, None);
        let first = collection.entities[0].expanded("Roles").unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first.count, Some(1));
        assert_eq!(
            first.entities[0].value("RoleCategory"),
            Some(&Value::from("A"))
        );
        let second = collection.entities[1].expanded("Roles").unwrap();
        assert!(second.is_empty());
        assert_eq!(second.count, Some(0));
    }

    struct Tokens;

    impl SkipTokenProvider for Tokens {
        fn get(&self, expand_path: &[PageExpandInfo]) -> Option<serde_json::Value> {
            match expand_path {
                [] => Some(serde_json::json!("root-token")),
                [info] => Some(serde_json::json!({
                    "nav": info.navigation_property_name,
                    "key": info.key_path,
                })),
                _ => None,
            }
        }
    }

    #[test]
    fn skip_tokens_follow_the_expand_path() {
        let (et, props, key) = partner_paths();
        let rows = vec![tuple(&[
            ("ID", Value::from("7")),
            ("Address/CityName", Value::Null),
        ])];
        let mut root = ExpandQueryResult::root(et.clone(), props.clone(), &key, rows);
        let child = ExpandQueryResult::new(et, props, &key, IndexMap::new())
            .with_link(vec!["ID".to_string()]);
        root.put_child("Roles", ChildResult::Expand(child)).unwrap();

        let collection = root
            .assemble(ROOT_RESULT_KEY, &mut Vec::new(), Some(&Tokens))
            .unwrap();
        assert_eq!(collection.skip_token.as_deref(), Some("root-token"));
        let roles = collection.entities[0].expanded("Roles").unwrap();
        let token: serde_json::Value =
            serde_json::from_str(roles.skip_token.as_deref().unwrap()).unwrap();
        assert_eq!(token, serde_json::json!({"nav": "Roles", "key": "7"}));
    }
}
