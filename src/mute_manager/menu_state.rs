/// Visibility of a single toolbar action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MenuItemState {
    pub visible: bool,
    pub enabled: bool,
}

impl MenuItemState {
    pub const HIDDEN: MenuItemState = MenuItemState {
        visible: false,
        enabled: false,
    };

    pub const fn shown(enabled: bool) -> Self {
        MenuItemState {
            visible: true,
            enabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteMenuState {
    pub mute: MenuItemState,
    pub unmute: MenuItemState,
}

/// Maps filter support and the mute state (`None` while unknown or in flight) onto the mute/unmute actions
pub fn project_mute_menu(supports_filtering: bool, muted: Option<bool>) -> MuteMenuState {
    if !supports_filtering {
        return MuteMenuState {
            mute: MenuItemState::HIDDEN,
            unmute: MenuItemState::HIDDEN,
        };
    }
    match muted {
        None => MuteMenuState {
            mute: MenuItemState::shown(false),
            unmute: MenuItemState::HIDDEN,
        },
        Some(false) => MuteMenuState {
            mute: MenuItemState::shown(true),
            unmute: MenuItemState::HIDDEN,
        },
        Some(true) => MuteMenuState {
            mute: MenuItemState::HIDDEN,
            unmute: MenuItemState::shown(true),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowMenuState {
    pub follow: MenuItemState,
    pub unfollow: MenuItemState,
}

pub fn project_follow_menu(following: Option<bool>) -> FollowMenuState {
    FollowMenuState {
        follow: match following {
            Some(false) => MenuItemState::shown(true),
            _ => MenuItemState::HIDDEN,
        },
        unfollow: match following {
            Some(true) => MenuItemState::shown(true),
            _ => MenuItemState::HIDDEN,
        },
    }
}
