use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::{debug, error, warn};
use thiserror::Error;

use crate::animation::{ClipLibrary, ClipName};
use crate::mesh::{parse_obj, MeshData};
use crate::scene::CharacterSpec;

/// Errors raised at the asset boundary. They are logged and the entry is
/// parked; there is no retry and no fallback asset.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unable to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("character clip table is missing {0}")]
    MissingClip(&'static str),
    #[error("character model has no node named {0}")]
    MissingFaceNode(String),
}

/// Explicit handle for an entity whose backing data may not have arrived
/// yet. Consumers check `is_ready` at the start of a frame instead of
/// null-guarding every use site.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable<T> {
    Pending,
    Ready(T),
    Failed,
}

impl<T> Loadable<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Loadable::Ready(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Loadable::Failed)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Loadable::Ready(value) => Some(value),
            _ => None,
        }
    }
}

struct LoadResult {
    name: String,
    outcome: Result<MeshData, AssetError>,
}

/// Mesh library fed by a background loader thread.
///
/// Requests are queued to the worker; finished loads are drained by `poll`
/// at the start of each frame, so the render loop never blocks on I/O.
/// In-flight loads are not cancelled.
pub struct AssetLibrary {
    meshes: HashMap<String, Loadable<MeshData>>,
    requests: Option<Sender<String>>,
    results: Receiver<LoadResult>,
    worker: Option<JoinHandle<()>>,
}

impl AssetLibrary {
    /// Spawns the loader thread rooted at the given asset directory.
    pub fn start(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let (request_tx, request_rx) = mpsc::channel::<String>();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = thread::spawn(move || {
            for name in request_rx {
                let outcome = load_mesh(&root, &name);
                let delivered = result_tx.send(LoadResult { name, outcome });
                if delivered.is_err() {
                    break;
                }
            }
        });
        Self {
            meshes: HashMap::new(),
            requests: Some(request_tx),
            results: result_rx,
            worker: Some(worker),
        }
    }

    /// Queues a mesh for loading. Names already requested (in any state) are
    /// ignored.
    pub fn request(&mut self, name: &str) {
        if self.meshes.contains_key(name) {
            return;
        }
        let Some(requests) = self.requests.as_ref() else {
            return;
        };
        if requests.send(name.to_string()).is_ok() {
            self.meshes.insert(name.to_string(), Loadable::Pending);
        } else {
            error!("asset loader is gone; {name} will never load");
            self.meshes.insert(name.to_string(), Loadable::Failed);
        }
    }

    pub fn request_all<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.request(name.as_ref());
        }
    }

    /// Drains finished loads. Returns how many entries changed state.
    pub fn poll(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(result) = self.results.try_recv() {
            delivered += 1;
            match result.outcome {
                Ok(mesh) => {
                    debug!("mesh {} ready", result.name);
                    self.meshes.insert(result.name, Loadable::Ready(mesh));
                }
                Err(err) => {
                    error!("{err}");
                    self.meshes.insert(result.name, Loadable::Failed);
                }
            }
        }
        delivered
    }

    pub fn state(&self, name: &str) -> Option<&Loadable<MeshData>> {
        self.meshes.get(name)
    }

    pub fn mesh(&self, name: &str) -> Option<&MeshData> {
        self.meshes.get(name).and_then(Loadable::get)
    }

    /// Names whose load has finished successfully.
    pub fn ready_names(&self) -> Vec<&str> {
        self.meshes
            .iter()
            .filter(|(_, state)| state.is_ready())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.meshes
            .values()
            .filter(|state| matches!(state, Loadable::Pending))
            .count()
    }

    pub fn is_idle(&self) -> bool {
        self.pending_count() == 0
    }
}

impl Drop for AssetLibrary {
    fn drop(&mut self) {
        // closing the request channel lets the worker run down its queue
        self.requests.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn load_mesh(root: &Path, name: &str) -> Result<MeshData, AssetError> {
    let path = root.join(name);
    let source = std::fs::read_to_string(&path).map_err(|source| AssetError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_obj(&source).map_err(|err| AssetError::Parse {
        path: path.display().to_string(),
        message: format!("{err:#}"),
    })
}

/// Checks the character schema against the fixed clip vocabulary and the
/// morphable face node, returning the resolved clip library.
///
/// A missing expected name is a schema error surfaced to the caller, which
/// logs it and leaves the dependent feature inert; clips outside the
/// vocabulary are skipped with a warning.
pub fn validate_character(spec: &CharacterSpec) -> Result<ClipLibrary, AssetError> {
    let mut entries = Vec::new();
    for entry in &spec.clips {
        match ClipName::from_name(&entry.name) {
            Some(clip) => entries.push((clip, entry.duration)),
            None => warn!("ignoring clip {} outside the vocabulary", entry.name),
        }
    }
    let library = ClipLibrary::new(&entries);
    for clip in ClipName::ALL {
        if !library.contains(clip) {
            return Err(AssetError::MissingClip(clip.as_str()));
        }
    }
    if let Some(face) = spec.face.as_deref() {
        if !spec.nodes.iter().any(|node| node == face) {
            return Err(AssetError::MissingFaceNode(face.to_string()));
        }
    }
    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ClipEntry;
    use std::io::Write;
    use std::time::{Duration, Instant};

    const CUBE: &str = "\
v -0.5 -0.5 0.5
v 0.5 -0.5 0.5
v 0.5 0.5 0.5
v -0.5 0.5 0.5
f 1 2 3 4
";

    fn drain(library: &mut AssetLibrary) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !library.is_idle() {
            library.poll();
            assert!(Instant::now() < deadline, "loader did not settle in time");
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn loads_meshes_from_disk_in_the_background() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("cube.obj")).unwrap();
        file.write_all(CUBE.as_bytes()).unwrap();

        let mut library = AssetLibrary::start(dir.path());
        library.request("cube.obj");
        assert!(!library.state("cube.obj").unwrap().is_ready());

        drain(&mut library);
        let mesh = library.mesh("cube.obj").unwrap();
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn missing_file_parks_the_entry_as_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = AssetLibrary::start(dir.path());
        library.request("ghost.obj");
        drain(&mut library);
        assert!(library.state("ghost.obj").unwrap().is_failed());
        assert!(library.mesh("ghost.obj").is_none());
    }

    #[test]
    fn duplicate_requests_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut library = AssetLibrary::start(dir.path());
        library.request("ghost.obj");
        library.request("ghost.obj");
        drain(&mut library);
        assert_eq!(library.poll(), 0);
    }

    fn full_character() -> CharacterSpec {
        CharacterSpec {
            face: Some("Head_4".to_string()),
            nodes: vec!["Head_4".to_string(), "Bone".to_string()],
            clips: ClipName::ALL
                .into_iter()
                .map(|clip| ClipEntry {
                    name: clip.as_str().to_string(),
                    duration: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn validate_accepts_the_full_vocabulary() {
        let library = validate_character(&full_character()).unwrap();
        assert!(library.contains(ClipName::ThumbsUp));
    }

    #[test]
    fn validate_rejects_a_missing_clip() {
        let mut spec = full_character();
        spec.clips.retain(|clip| clip.name != "Wave");
        let err = validate_character(&spec).unwrap_err();
        assert!(matches!(err, AssetError::MissingClip("Wave")));
    }

    #[test]
    fn validate_rejects_an_unknown_face_node() {
        let mut spec = full_character();
        spec.nodes.clear();
        let err = validate_character(&spec).unwrap_err();
        assert!(matches!(err, AssetError::MissingFaceNode(_)));
    }

    #[test]
    fn clips_outside_the_vocabulary_are_skipped() {
        let mut spec = full_character();
        spec.clips.push(ClipEntry {
            name: "Moonwalk".to_string(),
            duration: 2.0,
        });
        assert!(validate_character(&spec).is_ok());
    }
}
