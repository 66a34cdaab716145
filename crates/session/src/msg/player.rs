use glam::Vec3;

use super::Message;
use crate::error::MessageError;

pub const MAX_STATS: usize = 16;

const VECTOR_FIELDS: usize = 3;
const INT_FIELDS: usize = 9;
const PLAYER_FIELD_BITS: u32 = (VECTOR_FIELDS + INT_FIELDS) as u32;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlayerState {
    pub command_time: i32,
    pub pm_type: i32,
    pub pm_flags: i32,
    pub origin: Vec3,
    pub velocity: Vec3,
    pub view_angles: Vec3,
    pub weapon: i32,
    pub weapon_state: i32,
    pub client_num: i32,
    pub view_height: i32,
    pub gravity: i32,
    pub speed: i32,
    pub stats: [i32; MAX_STATS],
    pub ammo: [i32; MAX_STATS],
}

impl PlayerState {
    fn vectors(&self) -> [Vec3; VECTOR_FIELDS] {
        [self.origin, self.velocity, self.view_angles]
    }

    fn vectors_mut(&mut self) -> [&mut Vec3; VECTOR_FIELDS] {
        [&mut self.origin, &mut self.velocity, &mut self.view_angles]
    }

    fn ints(&self) -> [i32; INT_FIELDS] {
        [
            self.command_time,
            self.pm_type,
            self.pm_flags,
            self.weapon,
            self.weapon_state,
            self.client_num,
            self.view_height,
            self.gravity,
            self.speed,
        ]
    }

    fn ints_mut(&mut self) -> [&mut i32; INT_FIELDS] {
        [
            &mut self.command_time,
            &mut self.pm_type,
            &mut self.pm_flags,
            &mut self.weapon,
            &mut self.weapon_state,
            &mut self.client_num,
            &mut self.view_height,
            &mut self.gravity,
            &mut self.speed,
        ]
    }
}

fn array_mask(from: &[i32; MAX_STATS], to: &[i32; MAX_STATS]) -> u32 {
    from.iter()
        .zip(to)
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .fold(0, |mask, (i, _)| mask | (1 << i))
}

fn write_array(msg: &mut Message, from: &[i32; MAX_STATS], to: &[i32; MAX_STATS]) {
    let mask = array_mask(from, to);
    if mask == 0 {
        msg.write_bits(0, 1);
        return;
    }
    msg.write_bits(1, 1);
    msg.write_bits(mask, MAX_STATS as u32);
    for (i, value) in to.iter().enumerate() {
        if mask & (1 << i) != 0 {
            msg.write_long(*value);
        }
    }
}

fn read_array(msg: &mut Message, to: &mut [i32; MAX_STATS]) -> Result<(), MessageError> {
    if msg.read_bits(1)? == 0 {
        return Ok(());
    }
    let mask = msg.read_bits(MAX_STATS as u32)?;
    for (i, value) in to.iter_mut().enumerate() {
        if mask & (1 << i) != 0 {
            *value = msg.read_long()?;
        }
    }
    Ok(())
}

/// A missing `from` deltas against the all-zero player state.
pub fn write_delta_playerstate(msg: &mut Message, from: Option<&PlayerState>, to: &PlayerState) {
    let null = PlayerState::default();
    let from = from.unwrap_or(&null);

    let mut mask = 0u32;
    for (i, (a, b)) in from.vectors().iter().zip(to.vectors()).enumerate() {
        if *a != b {
            mask |= 1 << i;
        }
    }
    for (i, (a, b)) in from.ints().iter().zip(to.ints()).enumerate() {
        if *a != b {
            mask |= 1 << (VECTOR_FIELDS + i);
        }
    }

    msg.write_bits(mask, PLAYER_FIELD_BITS);
    for (i, v) in to.vectors().iter().enumerate() {
        if mask & (1 << i) != 0 {
            msg.write_float(v.x);
            msg.write_float(v.y);
            msg.write_float(v.z);
        }
    }
    for (i, value) in to.ints().iter().enumerate() {
        if mask & (1 << (VECTOR_FIELDS + i)) != 0 {
            msg.write_long(*value);
        }
    }

    write_array(msg, &from.stats, &to.stats);
    write_array(msg, &from.ammo, &to.ammo);
}

pub fn read_delta_playerstate(
    msg: &mut Message,
    from: Option<&PlayerState>,
) -> Result<PlayerState, MessageError> {
    let mut to = from.copied().unwrap_or_default();

    let mask = msg.read_bits(PLAYER_FIELD_BITS)?;
    for (i, v) in to.vectors_mut().into_iter().enumerate() {
        if mask & (1 << i) != 0 {
            *v = Vec3::new(msg.read_float()?, msg.read_float()?, msg.read_float()?);
        }
    }
    for (i, value) in to.ints_mut().into_iter().enumerate() {
        if mask & (1 << (VECTOR_FIELDS + i)) != 0 {
            *value = msg.read_long()?;
        }
    }

    read_array(msg, &mut to.stats)?;
    read_array(msg, &mut to.ammo)?;
    Ok(to)
}
