use super::{BroadcastError, SceneControl, SceneSource};
use crate::config::ShowConfig;
use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct BoardSource {
    id: i64,
    name: String,
    enabled: bool,
}

#[derive(Debug, Default)]
struct BoardState {
    scenes: Vec<(String, Vec<BoardSource>)>,
    active_scene: Option<String>,
    next_id: i64,
    online: bool,
    failing: Vec<(String, String)>,
    commands: Vec<String>,
}

/// In-memory switcher used for dry runs and tests.
///
/// Every accepted command is appended to a log so callers can check exactly
/// what the show asked for and in which order.
#[derive(Debug)]
pub struct SceneBoard {
    state: Mutex<BoardState>,
}

impl Default for SceneBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneBoard {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BoardState {
                next_id: 1,
                online: true,
                ..Default::default()
            }),
        }
    }

    /// Board laid out the way the show config expects: one source per case in
    /// the selection scene, background plus staged/open sources per case in
    /// the opening scene. Everything starts visible.
    pub fn from_config(config: &ShowConfig) -> Self {
        let board = Self::new();
        let names = &config.scenes;

        let selection: Vec<String> = config.cases.iter().map(|c| names.selection_source_for(c)).collect();
        let mut opening = vec![names.opening_background.clone()];
        for case in &config.cases {
            opening.push(names.staged_source_for(case));
            opening.push(names.open_source_for(case));
        }

        board.add_scene(&names.selection_scene, &selection.iter().map(String::as_str).collect::<Vec<_>>());
        board.add_scene(&names.opening_scene, &opening.iter().map(String::as_str).collect::<Vec<_>>());
        board
    }

    /// Adds a scene, or replaces it with freshly numbered sources.
    pub fn add_scene(&self, scene: &str, sources: &[&str]) {
        let mut state = self.state.lock();
        let mut fresh = Vec::with_capacity(sources.len());
        for name in sources {
            fresh.push(BoardSource {
                id: state.next_id,
                name: name.to_string(),
                enabled: true,
            });
            state.next_id += 1;
        }
        match state.scenes.iter().position(|(n, _)| n == scene) {
            Some(idx) => state.scenes[idx].1 = fresh,
            None => state.scenes.push((scene.to_string(), fresh)),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    fn check_online(state: &BoardState) -> Result<(), BroadcastError> {
        if state.online {
            Ok(())
        } else {
            Err(BroadcastError::Unreachable("scene board is offline".to_string()))
        }
    }
}

#[cfg(test)]
impl SceneBoard {
    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    pub fn is_enabled(&self, scene: &str, source_name: &str) -> Option<bool> {
        let state = self.state.lock();
        state
            .scenes
            .iter()
            .find(|(n, _)| n == scene)?
            .1
            .iter()
            .find(|s| s.name == source_name)
            .map(|s| s.enabled)
    }

    pub fn enabled_sources(&self, scene: &str) -> Vec<String> {
        let state = self.state.lock();
        state
            .scenes
            .iter()
            .find(|(n, _)| n == scene)
            .map(|(_, sources)| sources.iter().filter(|s| s.enabled).map(|s| s.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn active_scene(&self) -> Option<String> {
        self.state.lock().active_scene.clone()
    }

    /// Makes every toggle of one source fail while the rest keep working.
    pub fn fail_source(&self, scene: &str, source_name: &str) {
        self.state
            .lock()
            .failing
            .push((scene.to_string(), source_name.to_string()));
    }
}

#[async_trait]
impl SceneControl for SceneBoard {
    async fn list_sources(&self, scene: &str) -> Result<Vec<SceneSource>, BroadcastError> {
        let state = self.state.lock();
        Self::check_online(&state)?;
        let (_, sources) = state
            .scenes
            .iter()
            .find(|(n, _)| n == scene)
            .ok_or_else(|| BroadcastError::UnknownScene(scene.to_string()))?;
        Ok(sources
            .iter()
            .map(|s| SceneSource {
                name: s.name.clone(),
                id: s.id,
            })
            .collect())
    }

    async fn set_source_enabled(&self, scene: &str, source_id: i64, enabled: bool) -> Result<(), BroadcastError> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;
        let BoardState { scenes, failing, commands, .. } = &mut *state;
        let (_, sources) = scenes
            .iter_mut()
            .find(|(n, _)| n == scene)
            .ok_or_else(|| BroadcastError::UnknownScene(scene.to_string()))?;
        let source = sources
            .iter_mut()
            .find(|s| s.id == source_id)
            .ok_or_else(|| BroadcastError::SourceNotFound {
                scene: scene.to_string(),
                source_name: format!("#{}", source_id),
            })?;
        if failing.iter().any(|(s, n)| s == scene && *n == source.name) {
            return Err(BroadcastError::Unreachable(format!("{} did not respond", source.name)));
        }
        source.enabled = enabled;
        let line = format!("{} {}/{}", if enabled { "show" } else { "hide" }, scene, source.name);
        info!("[board] {}", line);
        commands.push(line);
        Ok(())
    }

    async fn switch_scene(&self, scene: &str) -> Result<(), BroadcastError> {
        let mut state = self.state.lock();
        Self::check_online(&state)?;
        if !state.scenes.iter().any(|(n, _)| n == scene) {
            return Err(BroadcastError::UnknownScene(scene.to_string()));
        }
        state.active_scene = Some(scene.to_string());
        let line = format!("switch {}", scene);
        info!("[board] {}", line);
        state.commands.push(line);
        Ok(())
    }
}
