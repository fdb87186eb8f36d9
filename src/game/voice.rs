//! Voice channel authorization.
//!
//! Pure policy: (role, phase, liveness) → the channel set a player may
//! inhabit. The server never mutes the media provider directly; it refuses
//! to mint tokens for channels outside the directive and instructs the
//! client to move.

use crate::protocol::{Phase, Team, VoiceChannel, VoiceDirective};

use super::roles::Role;

/// Compute the channel directive for one player in one phase.
pub fn authorize(phase: Phase, role: Role, is_alive: bool) -> VoiceDirective {
    if !is_alive {
        return VoiceDirective::single(VoiceChannel::Dead);
    }
    if phase.is_night() {
        if role.team() == Team::Werewolves {
            VoiceDirective::single(VoiceChannel::Werewolf)
        } else {
            VoiceDirective::muted()
        }
    } else {
        VoiceDirective::single(VoiceChannel::Main)
    }
}
