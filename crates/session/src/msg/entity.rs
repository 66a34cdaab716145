use glam::Vec3;

use super::Message;
use crate::error::MessageError;
use crate::protocol::GENTITYNUM_BITS;

const VECTOR_FIELDS: usize = 3;
const INT_FIELDS: usize = 14;
pub const ENTITY_FIELD_BITS: u32 = (VECTOR_FIELDS + INT_FIELDS) as u32;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EntityState {
    pub number: u32,
    pub e_type: i32,
    pub e_flags: i32,
    pub origin: Vec3,
    pub angles: Vec3,
    pub origin2: Vec3,
    pub model_index: i32,
    pub model_index2: i32,
    pub client_num: i32,
    pub frame: i32,
    pub solid: i32,
    pub event: i32,
    pub event_parm: i32,
    pub powerups: i32,
    pub weapon: i32,
    pub legs_anim: i32,
    pub torso_anim: i32,
    pub generic1: i32,
}

impl EntityState {
    pub fn with_number(number: u32) -> Self {
        Self {
            number,
            ..Self::default()
        }
    }

    fn vectors(&self) -> [Vec3; VECTOR_FIELDS] {
        [self.origin, self.angles, self.origin2]
    }

    fn vectors_mut(&mut self) -> [&mut Vec3; VECTOR_FIELDS] {
        [&mut self.origin, &mut self.angles, &mut self.origin2]
    }

    fn ints(&self) -> [i32; INT_FIELDS] {
        [
            self.e_type,
            self.e_flags,
            self.model_index,
            self.model_index2,
            self.client_num,
            self.frame,
            self.solid,
            self.event,
            self.event_parm,
            self.powerups,
            self.weapon,
            self.legs_anim,
            self.torso_anim,
            self.generic1,
        ]
    }

    fn ints_mut(&mut self) -> [&mut i32; INT_FIELDS] {
        [
            &mut self.e_type,
            &mut self.e_flags,
            &mut self.model_index,
            &mut self.model_index2,
            &mut self.client_num,
            &mut self.frame,
            &mut self.solid,
            &mut self.event,
            &mut self.event_parm,
            &mut self.powerups,
            &mut self.weapon,
            &mut self.legs_anim,
            &mut self.torso_anim,
            &mut self.generic1,
        ]
    }

    fn changed_fields(&self, other: &Self) -> u32 {
        let mut mask = 0u32;
        for (i, (a, b)) in self.vectors().iter().zip(other.vectors()).enumerate() {
            if *a != b {
                mask |= 1 << i;
            }
        }
        for (i, (a, b)) in self.ints().iter().zip(other.ints()).enumerate() {
            if *a != b {
                mask |= 1 << (VECTOR_FIELDS + i);
            }
        }
        mask
    }
}

/// Writes `to` as a delta from `from`. `None` encodes a removal of `from`.
/// An unchanged entity writes nothing unless `force` is set.
pub fn write_delta_entity(
    msg: &mut Message,
    from: &EntityState,
    to: Option<&EntityState>,
    force: bool,
) {
    let Some(to) = to else {
        msg.write_bits(from.number, GENTITYNUM_BITS);
        msg.write_bits(1, 1);
        return;
    };

    let mask = from.changed_fields(to);
    if mask == 0 {
        if !force {
            return;
        }
        msg.write_bits(to.number, GENTITYNUM_BITS);
        msg.write_bits(0, 1);
        msg.write_bits(0, 1);
        return;
    }

    msg.write_bits(to.number, GENTITYNUM_BITS);
    msg.write_bits(0, 1);
    msg.write_bits(1, 1);
    msg.write_bits(mask, ENTITY_FIELD_BITS);

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
}

/// Reads the body of an entity delta whose number was already consumed.
/// Returns `None` when the entity was removed.
pub fn read_delta_entity(
    msg: &mut Message,
    from: &EntityState,
    number: u32,
) -> Result<Option<EntityState>, MessageError> {
    if msg.read_bits(1)? == 1 {
        return Ok(None);
    }

    let mut to = *from;
    to.number = number;

    if msg.read_bits(1)? == 0 {
        return Ok(Some(to));
    }

    let mask = msg.read_bits(ENTITY_FIELD_BITS)?;
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
    Ok(Some(to))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moving(number: u32) -> EntityState {
        EntityState {
            number,
            e_type: 2,
            origin: Vec3::new(10.0, -4.5, 128.0),
            frame: 7,
            ..EntityState::default()
        }
    }

    #[test]
    fn unchanged_writes_nothing_without_force() {
        let ent = moving(5);
        let mut msg = Message::new();
        write_delta_entity(&mut msg, &ent, Some(&ent), false);
        assert!(msg.is_empty());
    }

    #[test]
    fn forced_unchanged_reads_back_as_copy() {
        let ent = moving(5);
        let mut msg = Message::new();
        write_delta_entity(&mut msg, &ent, Some(&ent), true);

        let mut msg = Message::from_bytes(msg.as_bytes());
        assert_eq!(msg.read_bits(GENTITYNUM_BITS).unwrap(), 5);
        assert_eq!(read_delta_entity(&mut msg, &ent, 5).unwrap(), Some(ent));
    }

    #[test]
    fn delta_against_null_carries_every_changed_field() {
        let null = EntityState::default();
        let mut ent = moving(300);
        ent.angles = Vec3::new(0.0, 90.0, 0.0);
        ent.generic1 = -12;

        let mut msg = Message::new();
        write_delta_entity(&mut msg, &null, Some(&ent), true);

        let mut msg = Message::from_bytes(msg.as_bytes());
        let number = msg.read_bits(GENTITYNUM_BITS).unwrap();
        assert_eq!(number, 300);
        assert_eq!(read_delta_entity(&mut msg, &null, number).unwrap(), Some(ent));
    }

    #[test]
    fn removal_is_signalled() {
        let ent = moving(9);
        let mut msg = Message::new();
        write_delta_entity(&mut msg, &ent, None, true);

        let mut msg = Message::from_bytes(msg.as_bytes());
        assert_eq!(msg.read_bits(GENTITYNUM_BITS).unwrap(), 9);
        assert_eq!(read_delta_entity(&mut msg, &ent, 9).unwrap(), None);
    }
}
