//! Single-occupancy slot for the active plan or ramp.

/// Either nothing is in flight, or exactly one record is.
/// Ledgers export it as an `Option<T>`.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveSlot<T> {
    Idle,
    Active(T),
}

impl<T> ActiveSlot<T> {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Active(value) => Some(value),
            Self::Idle => None,
        }
    }

    pub fn get_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Active(value) => Some(value),
            Self::Idle => None,
        }
    }

    /// Place a record in the slot. Hands the record back if the slot is
    /// already occupied; the existing record is left untouched.
    pub fn occupy(&mut self, value: T) -> Result<(), T> {
        if self.is_active() {
            return Err(value);
        }
        *self = Self::Active(value);
        Ok(())
    }

    /// Empty the slot, returning the record that was in flight.
    pub fn take(&mut self) -> Option<T> {
        match std::mem::replace(self, Self::Idle) {
            Self::Active(value) => Some(value),
            Self::Idle => None,
        }
    }
}

impl<T> Default for ActiveSlot<T> {
    fn default() -> Self {
        Self::Idle
    }
}

impl<T> From<Option<T>> for ActiveSlot<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Active(value),
            None => Self::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occupy_rejects_second_record() {
        let mut slot = ActiveSlot::Idle;
        assert!(slot.occupy("first").is_ok());
        assert_eq!(slot.occupy("second"), Err("second"));
        assert_eq!(slot.get(), Some(&"first"));
    }

    #[test]
    fn test_take_clears_slot() {
        let mut slot = ActiveSlot::Active(7);
        assert_eq!(slot.take(), Some(7));
        assert!(!slot.is_active());
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn test_from_option() {
        assert_eq!(ActiveSlot::from(Some(3)), ActiveSlot::Active(3));
        assert_eq!(ActiveSlot::<u32>::from(None), ActiveSlot::Idle);
    }
}
