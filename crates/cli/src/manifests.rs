//! Desired-set construction: recursive manifest scanning, Kustomize
//! overlay rendering (delegated to the external `kustomize` engine) and
//! patch application.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use kube::core::DynamicObject;
use once_cell::sync::Lazy;

use kivo_core::codec::{is_kubernetes_object, is_kustomization, objects_to_yaml, read_objects};
use kivo_registry as registry;

use crate::logger;
use crate::App;

// the external build engine is not reentrant
static KUSTOMIZE_BUILD_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Builds the desired set for a command: from stdin (`-f -`), from pulled
/// OCI artifacts, or from local manifests and overlays. Patch overlays
/// apply to all three sources.
pub async fn desired_set(
    app: &App,
    kustomize: Option<&Path>,
    filenames: &[PathBuf],
    artifacts: &[String],
    patches: &[PathBuf],
) -> Result<Vec<DynamicObject>> {
    if is_stdin(filenames) {
        return read_stdin();
    }

    if !artifacts.is_empty() {
        let client = app.registry_client()?;
        let mut objects = Vec::new();
        for url in artifacts {
            logger::action(format!("pulling {url}"));
            let (yaml, _meta) = registry::pull(&client, url, &[])
                .await
                .with_context(|| format!("pulling {url} failed"))?;
            objects.extend(read_objects(&yaml)?);
        }
        for patch in patches {
            objects = apply_patches(patch, &objects)?;
        }
        return Ok(objects);
    }

    build_manifests(kustomize, filenames, patches)
}

/// Builds the desired set from a Kustomize overlay and/or plain manifest
/// paths, then applies the optional patch overlays on top.
pub fn build_manifests(
    kustomize: Option<&Path>,
    filenames: &[PathBuf],
    patches: &[PathBuf],
) -> Result<Vec<DynamicObject>> {
    let mut objects = Vec::new();

    if let Some(overlay) = kustomize {
        let data = build_kustomization(overlay)?;
        let objs = read_objects(&data).with_context(|| overlay.display().to_string())?;
        objects.extend(objs);
    }

    if !filenames.is_empty() {
        for manifest in scan(filenames)? {
            let data = fs::read_to_string(&manifest)
                .with_context(|| manifest.display().to_string())?;
            let objs = read_objects(&data).with_context(|| manifest.display().to_string())?;
            objects.extend(
                objs.into_iter()
                    .filter(|o| is_kubernetes_object(o) && !is_kustomization(o)),
            );
        }
    }

    for patch in patches {
        objects = apply_patches(patch, &objects)?;
    }

    Ok(objects)
}

/// Collects `.yaml`/`.yml` files from the given paths, walking directories
/// recursively in lexical order so the document order is deterministic.
pub fn scan(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut manifests = Vec::new();
    for path in paths {
        let meta = fs::metadata(path).with_context(|| path.display().to_string())?;
        if meta.is_dir() {
            scan_rec(path, &mut manifests)?;
        } else if match_ext(path) {
            manifests.push(path.clone());
        }
    }
    Ok(manifests)
}

fn scan_rec(dir: &Path, manifests: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| dir.display().to_string())?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .collect();
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            scan_rec(&entry, manifests)?;
        } else if match_ext(&entry) {
            manifests.push(entry);
        }
    }
    Ok(())
}

fn match_ext(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Renders a Kustomize overlay by shelling out to the external engine.
pub fn build_kustomization(base: &Path) -> Result<String> {
    let _guard = KUSTOMIZE_BUILD_MUTEX.lock().unwrap();

    let kfile = base.join("kustomization.yaml");
    let kfile_alt = base.join("kustomization.yml");
    if !kfile.exists() && !kfile_alt.exists() {
        bail!("{} not found", kfile.display());
    }

    let output = Command::new("kustomize")
        .arg("build")
        .arg(base)
        .output()
        .map_err(|e| anyhow!("kustomize binary not found in PATH, error: {e}"))?;

    if !output.status.success() {
        bail!(
            "kustomize build {} failed: {}",
            base.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8(output.stdout).context("kustomize produced invalid UTF-8")?)
}

/// Applies a patch overlay to the given objects: the `patches` entries of
/// the given kustomization file are replayed over the rendered set in a
/// scratch kustomization, and the external engine re-renders it.
pub fn apply_patches(patch: &Path, objects: &[DynamicObject]) -> Result<Vec<DynamicObject>> {
    let patch_body = fs::read_to_string(patch).with_context(|| patch.display().to_string())?;
    let template: serde_yaml::Value =
        serde_yaml::from_str(&patch_body).with_context(|| patch.display().to_string())?;
    let patches = template
        .get("patches")
        .filter(|p| !p.is_null())
        .cloned()
        .ok_or_else(|| anyhow!("no patches found in {}", patch.display()))?;

    let mut kustomization = serde_yaml::Mapping::new();
    kustomization.insert("apiVersion".into(), "kustomize.config.k8s.io/v1beta1".into());
    kustomization.insert("kind".into(), "Kustomization".into());
    kustomization.insert(
        "resources".into(),
        serde_yaml::Value::Sequence(vec!["all.yaml".into()]),
    );
    kustomization.insert("patches".into(), patches);

    let dir = tempfile::tempdir().context("creating patch scratch dir")?;
    fs::write(dir.path().join("all.yaml"), objects_to_yaml(objects)?)
        .context("staging rendered manifests")?;
    fs::write(
        dir.path().join("kustomization.yaml"),
        serde_yaml::to_string(&kustomization)?,
    )
    .context("staging patch kustomization")?;

    let data = build_kustomization(dir.path())?;
    Ok(read_objects(&data).with_context(|| patch.display().to_string())?)
}

/// Reads a desired set from stdin (`-f -`).
pub fn read_stdin() -> Result<Vec<DynamicObject>> {
    let data = std::io::read_to_string(std::io::stdin()).context("reading stdin")?;
    Ok(read_objects(&data)?)
}

/// True when the filename flags mean "read from stdin".
pub fn is_stdin(filenames: &[PathBuf]) -> bool {
    filenames.len() == 1 && filenames[0] == Path::new("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scans_recursively_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("b-sub")).unwrap();
        fs::write(dir.path().join("z.yaml"), "").unwrap();
        fs::write(dir.path().join("a.yml"), "").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();
        fs::write(dir.path().join("b-sub").join("c.yaml"), "").unwrap();

        let found = scan(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert_eq!(names, vec!["a.yml", "b-sub/c.yaml", "z.yaml"]);
    }

    #[test]
    fn scan_accepts_single_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("one.yaml");
        fs::write(&file, "").unwrap();
        assert_eq!(scan(&[file.clone()]).unwrap(), vec![file]);
    }

    #[test]
    fn stdin_flag_detection() {
        assert!(is_stdin(&[PathBuf::from("-")]));
        assert!(!is_stdin(&[PathBuf::from("dir")]));
        assert!(!is_stdin(&[PathBuf::from("-"), PathBuf::from("x")]));
    }

    #[test]
    fn patch_file_without_patches_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let patch = dir.path().join("patches.yaml");
        fs::write(&patch, "apiVersion: kustomize.config.k8s.io/v1beta1\nkind: Kustomization\n")
            .unwrap();
        let err = apply_patches(&patch, &[]).unwrap_err();
        assert!(err.to_string().contains("no patches found"));
    }

    #[test]
    fn missing_kustomization_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = build_kustomization(dir.path()).unwrap_err();
        assert!(err.to_string().contains("kustomization.yaml"));
    }
}
