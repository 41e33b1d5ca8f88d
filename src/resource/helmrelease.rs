//! Container images declared in the `values` of a Helm release.
//!
//! A chart's values have no fixed schema, so images are recognised by
//! convention. The shapes understood are:
//!
//! ```yaml
//! values:
//!   image: repo/image:tag          # one image for the whole release
//! ```
//!
//! ```yaml
//! values:
//!   image: repo/image              # same, with the tag held separately
//!   tag: v1
//! ```
//!
//! ```yaml
//! values:
//!   image:
//!     repository: repo/image       # same, as an object
//!     tag: v1
//! ```
//!
//! and each of those nested one level under an arbitrary key, which then
//! names the container:
//!
//! ```yaml
//! values:
//!   foo:
//!     image: repo/foo:v1
//!   bar:
//!     image:
//!       repository: repo/bar
//!       tag: v2
//! ```
//!
//! Anything else is ordinary chart configuration and is skipped without
//! complaint, including `image` fields that do not parse as a reference.

use std::convert::Infallible;
use std::fmt;

use log::{debug, trace};
use serde_yaml::{Mapping, Value};

use crate::error::{ManifestError, ResourceError};
use crate::image::ImageRef;
use crate::resource::values::{Values, kind_of};
use crate::resource::{BaseObject, Container, Workload};

/// Container name given to an image declared directly under `values`.
/// Callers key on this; it must not change.
pub const RELEASE_CONTAINER_NAME: &str = "chart-image";

/// Kinds whose `spec.values` are interpreted for images.
pub const HELM_RELEASE_KINDS: &[&str] = &["FluxHelmRelease", "HelmRelease"];

const IMAGE_KEY: &str = "image";
const TAG_KEY: &str = "tag";
const REPOSITORY_KEY: &str = "repository";

/// How an image declaration is laid out. A write-back keeps the layout it
/// was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageShape {
    /// `image: repo:tag`
    FlatCombined,
    /// `image: repo` with a sibling `tag: tag`
    FlatSplit,
    /// `image: {repository: repo, tag: tag}`
    NestedObject,
}

/// Where an image declaration lives, and in what shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageLocation {
    /// Top-level key holding the declaration; `None` when it sits
    /// directly under `values`.
    pub container: Option<String>,
    pub shape: ImageShape,
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match &self.container {
            Some(key) => format!("values.{}", key),
            None => "values".to_string(),
        };
        match self.shape {
            ImageShape::FlatCombined => write!(f, "{}.image", prefix),
            ImageShape::FlatSplit => write!(f, "{}.{{image,tag}}", prefix),
            ImageShape::NestedObject => write!(f, "{}.image.{{repository,tag}}", prefix),
        }
    }
}

/// Walk `values` and call `visit` with the container name, image and
/// location of every image declaration found.
///
/// Per-container keys are visited in sorted order. If `values` itself
/// declares an image, that is the only declaration reported. An error from
/// `visit` stops the walk and is returned as is.
pub fn find_containers<F, E>(values: &Values, mut visit: F) -> Result<(), E>
where
    F: FnMut(&str, &ImageRef, &ImageLocation) -> Result<(), E>,
{
    if let Some((image, shape)) = interpret(values.as_mapping()) {
        let location = ImageLocation {
            container: None,
            shape,
        };
        debug!("Found release image {} at {}", image, location);
        return visit(RELEASE_CONTAINER_NAME, &image, &location);
    }

    for key in values.sorted_keys() {
        let Some(Value::Mapping(m)) = values.get(&key) else {
            continue;
        };
        match interpret(m) {
            Some((image, shape)) => {
                let location = ImageLocation {
                    container: Some(key.clone()),
                    shape,
                };
                debug!("Found container {} image {} at {}", key, image, location);
                visit(&key, &image, &location)?;
            }
            None => trace!("Key {} does not declare an image", key),
        }
    }

    Ok(())
}

/// Recognise an image declaration in `m` itself (not in its children).
fn interpret(m: &Mapping) -> Option<(ImageRef, ImageShape)> {
    match m.get(IMAGE_KEY)? {
        Value::String(s) => {
            let mut image = ImageRef::parse(s).ok()?;
            match m.get(TAG_KEY) {
                Some(Value::String(tag)) => {
                    image.tag = tag.clone();
                    Some((image, ImageShape::FlatSplit))
                }
                _ => Some((image, ImageShape::FlatCombined)),
            }
        }
        Value::Mapping(img) => {
            let repository = img.get(REPOSITORY_KEY)?.as_str()?;
            let tag = img.get(TAG_KEY)?.as_str()?;
            let image = ImageRef::parse(&format!("{}:{}", repository, tag)).ok()?;
            Some((image, ImageShape::NestedObject))
        }
        other => {
            trace!("Ignoring image field of type {}", kind_of(other));
            None
        }
    }
}

/// Write `image` to `location` in `values`, in the location's shape.
///
/// Fails with `StaleLocation` if the fields the location refers to are no
/// longer there with the types they were read with.
pub fn apply(
    values: &mut Values,
    location: &ImageLocation,
    image: &ImageRef,
) -> Result<(), ResourceError> {
    let stale = || ResourceError::StaleLocation(location.to_string());

    let target = match &location.container {
        None => values.as_mapping_mut(),
        Some(key) => values
            .as_mapping_mut()
            .get_mut(key.as_str())
            .and_then(Value::as_mapping_mut)
            .ok_or_else(stale)?,
    };

    match location.shape {
        ImageShape::FlatCombined => {
            if !is_string(target, IMAGE_KEY) {
                return Err(stale());
            }
            set_string(target, IMAGE_KEY, image.to_string());
        }
        ImageShape::FlatSplit => {
            if !is_string(target, IMAGE_KEY) || !is_string(target, TAG_KEY) {
                return Err(stale());
            }
            set_string(target, IMAGE_KEY, image.name.to_string());
            set_string(target, TAG_KEY, image.tag.clone());
        }
        ImageShape::NestedObject => {
            let obj = target
                .get_mut(IMAGE_KEY)
                .and_then(Value::as_mapping_mut)
                .ok_or_else(stale)?;
            if !is_string(obj, REPOSITORY_KEY) || !is_string(obj, TAG_KEY) {
                return Err(stale());
            }
            set_string(obj, REPOSITORY_KEY, image.name.to_string());
            set_string(obj, TAG_KEY, image.tag.clone());
        }
    }

    Ok(())
}

fn is_string(m: &Mapping, key: &str) -> bool {
    matches!(m.get(key), Some(Value::String(_)))
}

// Replacing an existing key keeps its position in the mapping.
fn set_string(m: &mut Mapping, key: &str, value: String) {
    m.insert(Value::String(key.to_string()), Value::String(value));
}

/// Every container and image declared in `values`, in scan order.
pub fn containers(values: &Values) -> Vec<Container> {
    let mut containers = Vec::new();
    let Ok(()) = find_containers::<_, Infallible>(values, |name, image, _| {
        containers.push(Container {
            name: name.to_string(),
            image: image.clone(),
        });
        Ok(())
    });
    containers
}

/// Stops the scan at the first matching declaration.
struct Found(ImageLocation);

/// Rewrite the image of `container` in `values`.
///
/// The scan stops at the first declaration with that name, so a later one
/// is neither visited nor changed. Names come from distinct keys, so a
/// second one is not expected.
pub fn set_container_image(
    values: &mut Values,
    container: &str,
    image: &ImageRef,
) -> Result<(), ResourceError> {
    let scan = find_containers(values, |name, _, location| {
        if name == container {
            Err(Found(location.clone()))
        } else {
            Ok(())
        }
    });

    match scan {
        Err(Found(location)) => {
            debug!("Setting {} at {} to {}", container, location, image);
            apply(values, &location, image)
        }
        Ok(()) => Err(ResourceError::ContainerNotFound {
            container: container.to_string(),
            resource: "values".to_string(),
        }),
    }
}

/// A Flux Helm release, with its values interpreted as containers.
#[derive(Debug, Clone, PartialEq)]
pub struct FluxHelmRelease {
    pub base: BaseObject,
    pub values: Values,
    /// The whole document as read, so it can be rendered back out.
    raw: Value,
}

impl FluxHelmRelease {
    pub fn is_helm_release_kind(kind: &str) -> bool {
        HELM_RELEASE_KINDS.contains(&kind)
    }

    /// Build from a decoded manifest document.
    pub fn from_yaml(raw: Value, base: BaseObject) -> Result<Self, ManifestError> {
        let values = raw
            .get("spec")
            .and_then(|spec| spec.get("values"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(Self {
            base,
            values: Values::from_yaml(values)?,
            raw,
        })
    }

    /// Build from an object read from the cluster API.
    pub fn from_json(object: serde_json::Value) -> Result<Self, ManifestError> {
        let raw = serde_yaml::to_value(object)
            .map_err(|e| ManifestError::InvalidValues(e.to_string()))?;
        let base = BaseObject::from_value(&raw, "api", 0)?;
        Self::from_yaml(raw, base)
    }

    /// The document with current values written back into `spec.values`.
    pub fn to_yaml_value(&self) -> Value {
        let mut raw = self.raw.clone();
        let had_values = raw
            .get("spec")
            .and_then(|s| s.get("values"))
            .is_some_and(|v| !v.is_null());
        if !had_values && self.values.is_empty() {
            return raw;
        }
        if let Some(doc) = raw.as_mapping_mut() {
            let spec = doc
                .entry(Value::String("spec".to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if let Some(spec) = spec.as_mapping_mut() {
                spec.insert(
                    Value::String("values".to_string()),
                    self.values.clone().into_value(),
                );
            }
        }
        raw
    }
}

impl Workload for FluxHelmRelease {
    fn containers(&self) -> Vec<Container> {
        containers(&self.values)
    }

    fn set_container_image(
        &mut self,
        container: &str,
        image: &ImageRef,
    ) -> Result<(), ResourceError> {
        set_container_image(&mut self.values, container, image).map_err(|e| match e {
            ResourceError::ContainerNotFound { container, .. } => {
                ResourceError::ContainerNotFound {
                    container,
                    resource: format!("{} {}", self.base.kind, self.base.resource_id()),
                }
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn values(yaml: &str) -> Values {
        Values::from_yaml_str(yaml).unwrap()
    }

    fn image(s: &str) -> ImageRef {
        ImageRef::parse(s).unwrap()
    }

    fn names(values: &Values) -> Vec<String> {
        containers(values).into_iter().map(|c| c.name).collect()
    }

    #[test]
    fn test_release_image_string() {
        let v = values("first: post\nimage: bitnami/mariadb:10.1.30-r1\npersistence:\n  enabled: false\n");
        let found = containers(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, RELEASE_CONTAINER_NAME);
        assert_eq!(found[0].image.to_string(), "bitnami/mariadb:10.1.30-r1");
    }

    #[test]
    fn test_release_image_with_tag_keeps_split_shape() {
        let mut v = values("image: bitnami/mariadb\ntag: 10.1.30-r1\n");
        let found = containers(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].image.to_string(), "bitnami/mariadb:10.1.30-r1");

        set_container_image(&mut v, RELEASE_CONTAINER_NAME, &image("repo2:t2")).unwrap();
        assert_eq!(v.get("image"), Some(&Value::String("repo2".into())));
        assert_eq!(v.get("tag"), Some(&Value::String("t2".into())));
    }

    #[test]
    fn test_release_image_object() {
        let mut v = values(
            "image:\n  repository: bitnami/mariadb\n  tag: 10.1.30-r1\npersistence:\n  enabled: false\n",
        );
        let found = containers(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, RELEASE_CONTAINER_NAME);

        let new = found[0].image.with_new_tag("some-other-tag");
        set_container_image(&mut v, RELEASE_CONTAINER_NAME, &new).unwrap();
        assert_eq!(containers(&v)[0].image, new);
        assert_eq!(v, values(
            "image:\n  repository: bitnami/mariadb\n  tag: some-other-tag\npersistence:\n  enabled: false\n",
        ));
    }

    #[test]
    fn test_named_container() {
        let mut v = values(
            r#"
other:
  not: "containing image"
db:
  first: post
  image: bitnami/mariadb:10.1.30-r1
  persistence:
    enabled: false
"#,
        );
        let found = containers(&v);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "db");

        set_container_image(&mut v, "db", &image("bitnami/mariadb:some-other-tag")).unwrap();
        let db = v.get("db").unwrap();
        assert_eq!(
            db.get("image"),
            Some(&Value::String("bitnami/mariadb:some-other-tag".into()))
        );
        assert_eq!(db.get("tag"), None);
        assert_eq!(v.get("other"), values("other:\n  not: containing image\n").get("other"));
    }

    #[test]
    fn test_named_container_with_tag() {
        let mut v = values(
            "db:\n  image: bitnami/mariadb\n  tag: 10.1.30-r1\n  persistence:\n    enabled: false\n",
        );
        assert_eq!(containers(&v)[0].image.to_string(), "bitnami/mariadb:10.1.30-r1");

        set_container_image(&mut v, "db", &image("bitnami/mariadb:some-other-tag")).unwrap();
        assert_eq!(v, values(
            "db:\n  image: bitnami/mariadb\n  tag: some-other-tag\n  persistence:\n    enabled: false\n",
        ));
    }

    #[test]
    fn test_named_container_object_updates_only_tag() {
        let mut v = values(
            r#"
db:
  first: post
  image:
    repository: bitnami/mariadb
    tag: 10.1.30-r1
  persistence:
    enabled: false
"#,
        );
        let found = containers(&v);
        assert_eq!(found[0].image.to_string(), "bitnami/mariadb:10.1.30-r1");

        let new = found[0].image.with_new_tag("some-other-tag");
        set_container_image(&mut v, "db", &new).unwrap();
        assert_eq!(
            v,
            values(
                r#"
db:
  first: post
  image:
    repository: bitnami/mariadb
    tag: some-other-tag
  persistence:
    enabled: false
"#
            )
        );
    }

    #[test]
    fn test_release_image_hides_per_container_images() {
        let v = values("image: app:1\nsidecar:\n  image: proxy:2\n");
        assert_eq!(names(&v), vec![RELEASE_CONTAINER_NAME]);
    }

    #[test]
    fn test_unparsable_or_mistyped_fields_are_skipped() {
        let v = values(
            r#"
flag:
  image: true
blank:
  image: ""
bad:
  image: "a:b:c"
partial:
  image:
    repository: repo
numeric:
  image:
    repository: repo
    tag: 1.5
deep:
  nested:
    image: never/seen:1
list:
  - image: nope:1
ok:
  image: fine:1
"#,
        );
        assert_eq!(names(&v), vec!["ok"]);
    }

    #[test]
    fn test_unparsable_release_image_falls_through() {
        let v = values("image: \"a:b:c\"\nweb:\n  image: nginx:1.25\n");
        assert_eq!(names(&v), vec!["web"]);
    }

    #[test]
    fn test_non_string_tag_is_not_split() {
        let mut v = values("web:\n  image: nginx:1.25\n  tag: 3\n");
        assert_eq!(containers(&v)[0].image.to_string(), "nginx:1.25");
        set_container_image(&mut v, "web", &image("nginx:1.26")).unwrap();
        assert_eq!(v, values("web:\n  image: nginx:1.26\n  tag: 3\n"));
    }

    #[test]
    fn test_not_found_leaves_values_untouched() {
        let mut v = values("db:\n  image: mariadb:10\nweb:\n  image: nginx:1\n");
        let before = v.clone();
        let err = set_container_image(&mut v, "cache", &image("redis:7")).unwrap_err();
        assert!(matches!(err, ResourceError::ContainerNotFound { ref container, .. } if container == "cache"));
        assert_eq!(v, before);
        assert_eq!(
            serde_yaml::to_string(&v).unwrap(),
            serde_yaml::to_string(&before).unwrap()
        );
    }

    #[test]
    fn test_set_changes_only_the_named_container() {
        let mut v = values("a:\n  image: a:1\nb:\n  image: b:1\nc:\n  image: c:1\n");
        set_container_image(&mut v, "b", &image("b:2")).unwrap();
        assert_eq!(v, values("a:\n  image: a:1\nb:\n  image: b:2\nc:\n  image: c:1\n"));
    }

    #[test]
    fn test_sorted_visit_order() {
        let v = values("foo:\n  image: repo/foo:v1\nbar:\n  image: repo/bar:v2\n");
        assert_eq!(names(&v), vec!["bar", "foo"]);
    }

    #[test]
    fn test_visit_error_aborts_scan() {
        let v = values("a:\n  image: a:1\nb:\n  image: b:1\nc:\n  image: c:1\n");
        let mut seen = Vec::new();
        let result = find_containers(&v, |name, _, _| {
            seen.push(name.to_string());
            if name == "b" { Err("stop") } else { Ok(()) }
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, vec!["a", "b"]);
    }

    #[test]
    fn test_release_visit_error_propagates() {
        let v = values("image: app:1\n");
        let result = find_containers(&v, |_, _, _| Err::<(), _>("boom"));
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_locations() {
        let v = values(
            "a:\n  image: a:1\nb:\n  image: b\n  tag: '2'\nc:\n  image:\n    repository: c\n    tag: '3'\n",
        );
        let mut locations = Vec::new();
        let Ok(()) = find_containers::<_, Infallible>(&v, |_, _, location| {
            locations.push(location.to_string());
            Ok(())
        });
        assert_eq!(
            locations,
            vec![
                "values.a.image",
                "values.b.{image,tag}",
                "values.c.image.{repository,tag}",
            ]
        );
    }

    #[test]
    fn test_apply_detects_stale_location() {
        let mut v = values("db:\n  image: mariadb:10\n");
        let location = ImageLocation {
            container: Some("db".to_string()),
            shape: ImageShape::NestedObject,
        };
        let err = apply(&mut v, &location, &image("mariadb:11")).unwrap_err();
        assert!(matches!(err, ResourceError::StaleLocation(_)));

        let gone = ImageLocation {
            container: Some("web".to_string()),
            shape: ImageShape::FlatCombined,
        };
        assert!(apply(&mut v, &gone, &image("nginx:1")).is_err());
        assert_eq!(v, values("db:\n  image: mariadb:10\n"));
    }

    #[test]
    fn test_json_origin() {
        let mut v = Values::from_json(json!({
            "db": {"image": {"repository": "bitnami/mariadb", "tag": "10.1"}},
            "persistence": {"enabled": false},
        }))
        .unwrap();
        assert_eq!(names(&v), vec!["db"]);
        set_container_image(&mut v, "db", &image("bitnami/mariadb:10.2")).unwrap();
        assert_eq!(containers(&v)[0].image.tag, "10.2");
    }

    #[test]
    fn test_workload_not_found_names_release() {
        let doc: Value = serde_yaml::from_str(
            "kind: FluxHelmRelease\nmetadata:\n  name: mariadb\n  namespace: maria\nspec:\n  values:\n    image: mariadb:10\n",
        )
        .unwrap();
        let base = BaseObject::from_value(&doc, "test", 0).unwrap();
        let mut fhr = FluxHelmRelease::from_yaml(doc, base).unwrap();
        let err = fhr.set_container_image("db", &image("mariadb:11")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "did not find container db in FluxHelmRelease maria:fluxhelmrelease/mariadb"
        );
    }

    #[test]
    fn test_to_yaml_value_writes_back_values() {
        let doc: Value = serde_yaml::from_str(
            "kind: HelmRelease\nmetadata:\n  name: web\nspec:\n  chart: web\n  values:\n    image: nginx:1\n",
        )
        .unwrap();
        let base = BaseObject::from_value(&doc, "test", 0).unwrap();
        let mut fhr = FluxHelmRelease::from_yaml(doc, base).unwrap();
        fhr.set_container_image(RELEASE_CONTAINER_NAME, &image("nginx:2"))
            .unwrap();

        let out = fhr.to_yaml_value();
        let spec = out.get("spec").unwrap();
        assert_eq!(spec.get("chart"), Some(&Value::String("web".into())));
        assert_eq!(
            spec.get("values").and_then(|v| v.get("image")),
            Some(&Value::String("nginx:2".into()))
        );
    }

    #[test]
    fn test_release_without_values() {
        let doc: Value =
            serde_yaml::from_str("kind: FluxHelmRelease\nmetadata:\n  name: empty\n").unwrap();
        let base = BaseObject::from_value(&doc, "test", 0).unwrap();
        let fhr = FluxHelmRelease::from_yaml(doc.clone(), base).unwrap();
        assert!(fhr.containers().is_empty());
        assert_eq!(fhr.to_yaml_value(), doc);
    }

    #[test]
    fn test_from_json_api_object() {
        let fhr = FluxHelmRelease::from_json(json!({
            "apiVersion": "helm.integrations.flux.weave.works/v1alpha2",
            "kind": "FluxHelmRelease",
            "metadata": {"name": "mariadb", "namespace": "maria"},
            "spec": {"values": {"image": "bitnami/mariadb", "tag": "10.1.30-r1"}},
        }))
        .unwrap();
        assert_eq!(fhr.base.resource_id(), "maria:fluxhelmrelease/mariadb");
        let found = fhr.containers();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].image.to_string(), "bitnami/mariadb:10.1.30-r1");
    }

    proptest! {
        #[test]
        fn prop_order_is_sorted_and_stable(
            keys in proptest::collection::btree_set("[a-z]{1,8}", 1..8),
            seed in any::<u64>(),
        ) {
            prop_assume!(!keys.contains("image"));
            let mut shuffled: Vec<String> = keys.iter().cloned().collect();
            let n = shuffled.len();
            shuffled.rotate_left((seed as usize) % n);

            let mut m = Mapping::new();
            for k in &shuffled {
                let mut inner = Mapping::new();
                inner.insert(
                    Value::String("image".into()),
                    Value::String(format!("repo/{}:v1", k)),
                );
                m.insert(Value::String(k.clone()), Value::Mapping(inner));
            }
            let v = Values::from(m);

            let expected: Vec<String> = keys.into_iter().collect();
            prop_assert_eq!(names(&v), expected);
            prop_assert_eq!(containers(&v), containers(&v));
        }
    }
}
