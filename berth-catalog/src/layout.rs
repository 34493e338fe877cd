use berth_core::{BerthType, CoachClass, CoreError, Quota, SeatAssignment};

use BerthType::{Aisle, Lower, Middle, SideLower, SideUpper, Upper, Window};

const BAY_OF_EIGHT: [BerthType; 8] = [Lower, Middle, Upper, Lower, Middle, Upper, SideLower, SideUpper];
const BAY_OF_SIX: [BerthType; 6] = [Lower, Upper, Lower, Upper, SideLower, SideUpper];
const CABIN_OF_FOUR: [BerthType; 4] = [Lower, Upper, Lower, Upper];
const ROW_OF_FOUR: [BerthType; 4] = [Window, Aisle, Aisle, Window];
const ROW_OF_TWO: [BerthType; 2] = [Window, Aisle];

/// Physical layout of one coach class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoachLayout {
    pub class: CoachClass,
    /// Coach label prefix, `S` for sleeper coaches S1, S2, ...
    pub prefix: &'static str,
    pub seats_per_unit: u32,
    /// Repeating berth pattern; one repetition is a structural block (bay, cabin, row).
    pub pattern: &'static [BerthType],
}

impl CoachLayout {
    pub fn for_class(class: CoachClass) -> CoachLayout {
        let (prefix, seats_per_unit, pattern): (&'static str, u32, &'static [BerthType]) = match class {
            CoachClass::Sleeper => ("S", 72, &BAY_OF_EIGHT),
            CoachClass::ThirdAc => ("B", 64, &BAY_OF_EIGHT),
            CoachClass::ThirdAcEconomy => ("M", 72, &BAY_OF_EIGHT),
            CoachClass::SecondAc => ("A", 48, &BAY_OF_SIX),
            CoachClass::FirstAc => ("H", 24, &CABIN_OF_FOUR),
            CoachClass::ChairCar => ("C", 72, &ROW_OF_FOUR),
            CoachClass::ExecutiveChair => ("E", 56, &ROW_OF_FOUR),
            CoachClass::SecondSitting => ("D", 100, &ROW_OF_TWO),
        };
        CoachLayout {
            class,
            prefix,
            seats_per_unit,
            pattern,
        }
    }

    pub fn total_seats(&self, units: u32) -> u32 {
        self.seats_per_unit * units
    }

    fn berth_at(&self, position: u32) -> BerthType {
        let len = self.pattern.len() as u32;
        self.pattern[((position - 1) % len) as usize]
    }

    /// Nearest ground-level position inside the block holding `position`.
    /// Ties go to the lower-numbered seat.
    fn nearest_ground_level(&self, position: u32) -> Option<u32> {
        let len = self.pattern.len() as u32;
        let block_start = ((position - 1) / len) * len + 1;
        let block_end = (block_start + len - 1).min(self.seats_per_unit);

        (block_start..=block_end)
            .filter(|p| self.berth_at(*p).is_ground_level())
            .min_by_key(|p| (p.abs_diff(position), *p))
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("running seat index must be 1-based")]
    ZeroIndex,

    #[error("seat {index} falls in {class} coach unit {unit}, but the train has only {units}")]
    UnitOutOfRange {
        class: CoachClass,
        index: u32,
        unit: u32,
        units: u32,
    },
}

impl From<LayoutError> for CoreError {
    fn from(err: LayoutError) -> Self {
        CoreError::ValidationError(err.to_string())
    }
}

/// Maps running seat indices to physical seats. Holds no state.
pub struct SeatLayoutMapper;

impl SeatLayoutMapper {
    /// Plain mapping: unit = ceil(n / seatsPerUnit), position within the unit, berth from the pattern.
    pub fn locate(class: CoachClass, index: u32, units: u32) -> Result<SeatAssignment, LayoutError> {
        if index == 0 {
            return Err(LayoutError::ZeroIndex);
        }
        let layout = CoachLayout::for_class(class);
        let unit = index.div_ceil(layout.seats_per_unit);
        if unit > units {
            return Err(LayoutError::UnitOutOfRange {
                class,
                index,
                unit,
                units,
            });
        }
        let position = (index - 1) % layout.seats_per_unit + 1;

        Ok(SeatAssignment {
            coach: format!("{}{}", layout.prefix, unit),
            coach_unit: unit,
            seat_number: position,
            berth: layout.berth_at(position),
            running_index: index,
        })
    }

    /// Mapping with the quota's berth preference applied.
    ///
    /// Quotas that prefer ground level get the nearest lower berth of the same block
    /// when the computed berth is not one. The returned `running_index` is that of the
    /// substituted seat; callers must still check it is free.
    pub fn map(class: CoachClass, index: u32, quota: Quota, units: u32) -> Result<SeatAssignment, LayoutError> {
        let seat = Self::locate(class, index, units)?;
        if !quota.prefers_ground_level() || seat.berth.is_ground_level() {
            return Ok(seat);
        }

        let layout = CoachLayout::for_class(class);
        match layout.nearest_ground_level(seat.seat_number) {
            Some(position) => {
                let substituted = (seat.coach_unit - 1) * layout.seats_per_unit + position;
                Self::locate(class, substituted, units)
            }
            None => Ok(seat),
        }
    }
}
