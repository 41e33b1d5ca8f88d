use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, ResourceError, Result};
use crate::image::ImageRef;

use super::utils::{read_manifest, resolve_workload_id};

/// What `hr-images set` should change.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub resource: Option<String>,
    pub container: String,
    /// Full replacement reference
    pub image: Option<String>,
    /// Replacement tag, used when `image` is not given
    pub tag: Option<String>,
    pub in_place: bool,
    pub create_backup: bool,
}

/// Change one container image and return the re-rendered manifest. With
/// `in_place`, the file is also rewritten.
pub fn handle_set(file: &Path, options: SetOptions) -> Result<String> {
    if options.in_place && file == Path::new("-") {
        return Err(Error::Usage("cannot rewrite stdin in place".to_string()));
    }

    let mut manifest = read_manifest(file)?;
    let id = resolve_workload_id(&manifest, options.resource.as_deref())?;
    let workload = manifest
        .get_mut(&id)
        .and_then(|r| r.as_workload_mut())
        .ok_or_else(|| Error::Usage(format!("{} has no containers to change", id)))?;

    let image = match (&options.image, &options.tag) {
        (Some(image), _) => ImageRef::parse(image)?,
        (None, Some(tag)) => {
            let current = workload
                .containers()
                .into_iter()
                .find(|c| c.name == options.container)
                .ok_or_else(|| ResourceError::ContainerNotFound {
                    container: options.container.clone(),
                    resource: id.clone(),
                })?;
            current.image.with_new_tag(tag.as_str())
        }
        (None, None) => return Err(Error::Usage("either an image or a tag is required".to_string())),
    };

    workload.set_container_image(&options.container, &image)?;
    log::info!("Set {} in {} to {}", options.container, id, image);

    let rendered = manifest.to_yaml()?;
    if options.in_place {
        if options.create_backup {
            let backup = backup_path(file);
            fs::copy(file, &backup)?;
            log::info!("Backed up {} to {}", file.display(), backup.display());
        }
        fs::write(file, &rendered)?;
    }
    Ok(rendered)
}

fn backup_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{Workload, parse_multidoc};
    use tempfile::TempDir;

    const RELEASE: &str = r#"apiVersion: helm.integrations.flux.weave.works/v1alpha2
kind: FluxHelmRelease
metadata:
  name: mariadb
  namespace: maria
spec:
  chartGitPath: mariadb
  values:
    db:
      image:
        repository: bitnami/mariadb
        tag: 10.1.30-r1
      persistence:
        enabled: false
"#;

    fn write_release(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("release.yaml");
        fs::write(&path, RELEASE).unwrap();
        path
    }

    fn image_of(rendered: &str, container: &str) -> String {
        let manifest = parse_multidoc(rendered.as_bytes(), "rendered").unwrap();
        let workload = manifest
            .get("maria:fluxhelmrelease/mariadb")
            .and_then(|r| r.as_workload())
            .unwrap();
        workload
            .containers()
            .into_iter()
            .find(|c| c.name == container)
            .map(|c| c.image.to_string())
            .unwrap()
    }

    #[test]
    fn test_set_tag_prints_without_touching_file() {
        let dir = TempDir::new().unwrap();
        let path = write_release(&dir);
        let rendered = handle_set(
            &path,
            SetOptions {
                container: "db".to_string(),
                tag: Some("10.2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(image_of(&rendered, "db"), "bitnami/mariadb:10.2");
        assert!(rendered.contains("chartGitPath: mariadb"));
        assert_eq!(fs::read_to_string(&path).unwrap(), RELEASE);
    }

    #[test]
    fn test_set_in_place_with_backup() {
        let dir = TempDir::new().unwrap();
        let path = write_release(&dir);
        handle_set(
            &path,
            SetOptions {
                container: "db".to_string(),
                image: Some("quay.io/acme/mariadb:11".to_string()),
                in_place: true,
                create_backup: true,
                ..Default::default()
            },
        )
        .unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(image_of(&written, "db"), "quay.io/acme/mariadb:11");
        assert_eq!(fs::read_to_string(backup_path(&path)).unwrap(), RELEASE);
    }

    #[test]
    fn test_unknown_container() {
        let dir = TempDir::new().unwrap();
        let path = write_release(&dir);
        for options in [
            SetOptions {
                container: "cache".to_string(),
                tag: Some("1".to_string()),
                ..Default::default()
            },
            SetOptions {
                container: "cache".to_string(),
                image: Some("redis:7".to_string()),
                ..Default::default()
            },
        ] {
            let err = handle_set(&path, options).unwrap_err();
            assert!(matches!(
                err,
                Error::Resource(ResourceError::ContainerNotFound { .. })
            ));
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), RELEASE);
    }

    #[test]
    fn test_invalid_image() {
        let dir = TempDir::new().unwrap();
        let path = write_release(&dir);
        let err = handle_set(
            &path,
            SetOptions {
                container: "db".to_string(),
                image: Some("a:b:c".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Image(_)));
    }

    #[test]
    fn test_stdin_cannot_be_rewritten() {
        let err = handle_set(
            Path::new("-"),
            SetOptions {
                container: "db".to_string(),
                tag: Some("1".to_string()),
                in_place: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
    }
}
