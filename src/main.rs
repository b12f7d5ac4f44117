#![forbid(unsafe_code)]

use std::sync::Arc;
use tagmute::config::TagMuteConfig;
use tagmute::hashtag_follow::HashtagFollowManager;
use tagmute::memory_server::{InMemoryFilterServer, ServerFlavor};
use tagmute::mute_manager::capabilities::{ServerCapabilities, ServerOperation, Version};
use tagmute::mute_manager::event_hub::{EventHub, TimelineEvent};
use tagmute::mute_manager::{HashtagMuteManager, Notice};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // MARK: - Setup basics

    env_logger::init();

    let cfg = TagMuteConfig::load_env().expect("Failed to load configuration");
    let flavor: ServerFlavor = cfg
        .simulator
        .server_api()
        .parse()
        .unwrap_or(ServerFlavor::V2);
    let hashtag = cfg.simulator.hashtag();

    let capabilities = if cfg.simulator.capabilities.is_empty() {
        // Advertise whichever filter API the simulated server implements
        let operation = match flavor {
            ServerFlavor::V2 | ServerFlavor::Both => ServerOperation::FiltersServer,
            ServerFlavor::V1Only => ServerOperation::FiltersClient,
        };
        ServerCapabilities::new().with_operation(operation, Version::new(1, 0, 0))
    } else {
        ServerCapabilities::from_pairs(
            cfg.simulator
                .capabilities
                .iter()
                .map(|c| (c.operation.as_str(), c.version.as_str())),
        )
        .expect("Invalid capability in configuration")
    };

    let server = Arc::new(InMemoryFilterServer::new(flavor));
    let event_hub = EventHub::new(cfg.event_bus_capacity());

    let mut mute_manager =
        HashtagMuteManager::from_config(&hashtag, server.clone(), event_hub.clone(), &cfg)
            .expect("Invalid filters_min_version")
            .with_capabilities(Some(capabilities));
    let mut follow_manager = HashtagFollowManager::new(
        &hashtag,
        server.clone(),
        event_hub.clone(),
        cfg.request_timeout(),
    );
    log::info!("Simulating #{} on a {:?} server", hashtag, flavor);

    // Stand-in for other screens reacting to filter changes
    let mut events = event_hub.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                TimelineEvent::FilterChanged(changed) => {
                    log::info!("Timelines in {:?} should reload", changed.context)
                }
                TimelineEvent::HashtagFollowChanged { hashtag, following } => {
                    log::info!("#{} following: {}", hashtag, following)
                }
            }
        }
    });

    if let Err(e) = follow_manager.refresh().await {
        log::warn!("Could not fetch tag: {}", e);
    }
    if let Err(e) = mute_manager.refresh().await {
        log::warn!("Could not determine mute state: {}", e);
    }
    log_menus(&mute_manager, &follow_manager);

    // MARK: - Command loop

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "status" => {
                if let Err(e) = mute_manager.refresh().await {
                    log::warn!("Could not determine mute state: {}", e);
                }
            }
            "mute" => {
                let result = mute_manager.mute().await;
                log::info!("{}", Notice::for_mute(&hashtag, &result));
            }
            "unmute" => {
                let result = mute_manager.unmute().await;
                log::info!("{}", Notice::for_unmute(&hashtag, &result));
            }
            "follow" => {
                if follow_manager.follow().await.is_err() {
                    log::info!("Error following #{}", hashtag);
                }
            }
            "unfollow" => {
                if follow_manager.unfollow().await.is_err() {
                    log::info!("Error unfollowing #{}", hashtag);
                }
            }
            "quit" | "exit" => break,
            "" => continue,
            other => log::warn!("Unknown command '{}'", other),
        }
        log_menus(&mute_manager, &follow_manager);
    }

    Ok(())
}

fn log_menus(mute_manager: &HashtagMuteManager, follow_manager: &HashtagFollowManager) {
    log::info!(
        "state: {} | mute menu: {:?} | follow menu: {:?}",
        mute_manager.state(),
        mute_manager.menu_state(),
        follow_manager.menu_state()
    );
}
