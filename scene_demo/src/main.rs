//! Scene registry demo
//!
//! Runs a short session against a loader that finishes work on background
//! threads: a blocking boot load, an async Single swap pumped from a frame
//! loop, a handler-queued additive load, a cancelled load and a merge.
//!
//! Pass a `.toml` or `.ron` registry config as the first argument to replace
//! the built-in build list.

use std::thread;
use std::time::Duration;

use futures::channel::oneshot;
use futures::FutureExt;
use scene_registry::foundation::logging;
use scene_registry::prelude::*;

const FRAME: Duration = Duration::from_millis(16);

/// Loader that completes each request on its own thread after a delay
struct ThreadedLoader {
    delay: Duration,
}

impl ThreadedLoader {
    fn new(delay: Duration) -> Self {
        Self { delay }
    }

    fn spawn(&self, verb: &'static str, scene: &SceneRecord) -> LoadFuture {
        let (sender, receiver) = oneshot::channel();
        let delay = self.delay;
        let path = scene.path().to_string();

        thread::spawn(move || {
            thread::sleep(delay);
            log::debug!("Loader finished {verb} of '{path}'");
            let _ = sender.send(Ok(()));
        });

        receiver
            .map(|answer| answer.unwrap_or(Err(LoaderError::Abandoned)))
            .boxed()
    }
}

impl SceneLoader for ThreadedLoader {
    fn begin_load(&mut self, scene: &SceneRecord) -> LoadFuture {
        self.spawn("load", scene)
    }

    fn begin_unload(&mut self, scene: &SceneRecord) -> UnloadFuture {
        self.spawn("unload", scene)
    }
}

fn default_config() -> RegistryConfig {
    RegistryConfig::new()
        .with_duplicate_names(DuplicateNamePolicy::Rename)
        .with_build(BuildManifest::from_paths([
            "scenes/Boot.scene",
            "scenes/Level1.scene",
            "scenes/Hud.scene",
            "scenes/Level2.scene",
        ]))
}

fn describe(event: &SceneEvent) -> String {
    let name = |scene: &Option<SceneRecord>| {
        scene
            .as_ref()
            .map_or_else(|| "<none>".to_string(), |scene| scene.name().to_string())
    };

    match event {
        SceneEvent::Loaded(scene) => format!("loaded {scene}"),
        SceneEvent::Unloaded(scene) => format!("unloaded {scene}"),
        SceneEvent::ActiveChanged { previous, next } => {
            format!("active scene {} -> {}", name(previous), name(next))
        }
    }
}

/// Frame loop: pump the registry until nothing is pending
fn pump(registry: &mut SceneRegistry) {
    let mut frames = 0;
    while registry.pending_count() > 0 {
        registry.update();
        frames += 1;
        thread::sleep(FRAME);
    }
    log::info!("Settled after {frames} frame(s)");
}

fn print_loaded(registry: &SceneRegistry) {
    let active = registry.active_scene();
    for scene in registry.list_loaded() {
        let marker = if Some(&scene) == active.as_ref() { "*" } else { " " };
        println!("  {marker} {scene}");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => RegistryConfig::load_from_file(path)?,
        None => default_config(),
    };
    logging::init_with_level(&config.log_level);

    let mut registry = SceneRegistry::new(config, ThreadedLoader::new(Duration::from_millis(40)))?;

    registry.subscribe(EventMask::all(), |event: &SceneEvent, _: &mut SceneCommands| {
        log::info!("{}", describe(event));
    });
    registry.subscribe(EventMask::LOADED, |event: &SceneEvent, commands: &mut SceneCommands| {
        if let SceneEvent::Loaded(scene) = event {
            if scene.name() == "Level1" {
                commands.load_async(SceneIdentity::name("Hud"), LoadMode::Additive);
            }
        }
    });

    let boot = registry.load(0usize, LoadMode::Single, false)?;
    log::info!("Boot: {:?}", boot.status());

    let level = registry.load(SceneIdentity::name("Level1"), LoadMode::Single, true)?;
    level.on_complete(|status| log::info!("Level1 swap finished: {status:?}"));
    pump(&mut registry);
    print_loaded(&registry);

    let arena = registry.create("Arena", CreateParams::default())?;
    let attempt = registry.load(&arena, LoadMode::Additive, true)?;
    attempt.cancel();
    pump(&mut registry);
    log::info!("Arena load: {:?}", attempt.status());

    registry.merge_scenes(SceneIdentity::name("Hud"), SceneIdentity::name("Level1"))?;
    print_loaded(&registry);

    for error in registry.drain_deferred_errors() {
        log::warn!("Deferred command failed: {error}");
    }
    Ok(())
}
