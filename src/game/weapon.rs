//! Weapon catalog and per-combatant weapon state

use serde::{Deserialize, Serialize};

use crate::protocol::MechaClass;

/// Weapon types in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    AssaultRifle,
    SubmachineGun,
    Pistol,
    SniperRifle,
    RocketLauncher,
    Minigun,
}

/// How a weapon responds to a held trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireMode {
    /// Keeps firing while the trigger is held, gated by fire rate
    Automatic,
    /// One shot per trigger press
    Single,
}

impl WeaponKind {
    pub const ALL: [WeaponKind; 6] = [
        Self::AssaultRifle,
        Self::SubmachineGun,
        Self::Pistol,
        Self::SniperRifle,
        Self::RocketLauncher,
        Self::Minigun,
    ];

    pub fn fire_mode(&self) -> FireMode {
        match self {
            Self::AssaultRifle | Self::SubmachineGun | Self::Minigun => FireMode::Automatic,
            // sniper-class and anti-armor-class fire once per press
            Self::Pistol | Self::SniperRifle | Self::RocketLauncher => FireMode::Single,
        }
    }
}

/// Immutable catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaponDefinition {
    pub name: String,
    pub kind: WeaponKind,
    /// Damage per hit
    pub damage: f32,
    /// Rounds per second
    pub fire_rate: f32,
    pub magazine_size: u32,
    /// Reserve capacity, excluding the loaded magazine
    pub max_reserve_ammo: u32,
    /// Reload duration (seconds)
    pub reload_time: f32,
    /// 0 = wild, 1 = perfect
    pub accuracy: f32,
    /// Recoil added per shot
    pub recoil: f32,
    pub range: f32,
}

impl WeaponDefinition {
    /// Minimum time between two shots (seconds)
    pub fn shot_interval(&self) -> f32 {
        if self.fire_rate > 0.0 {
            1.0 / self.fire_rate
        } else {
            f32::INFINITY
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn new(
        name: &str,
        kind: WeaponKind,
        damage: f32,
        fire_rate: f32,
        magazine_size: u32,
        max_reserve_ammo: u32,
        reload_time: f32,
        accuracy: f32,
        recoil: f32,
        range: f32,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            damage,
            fire_rate,
            magazine_size,
            max_reserve_ammo,
            reload_time,
            accuracy,
            recoil,
            range,
        }
    }
}

/// The weapon catalog, one entry per [`WeaponKind`]. Loaded once per process
/// and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponCatalog {
    pub assault_rifle: WeaponDefinition,
    pub submachine_gun: WeaponDefinition,
    pub pistol: WeaponDefinition,
    pub sniper_rifle: WeaponDefinition,
    pub rocket_launcher: WeaponDefinition,
    pub minigun: WeaponDefinition,
}

impl WeaponCatalog {
    pub fn definition(&self, kind: WeaponKind) -> &WeaponDefinition {
        match kind {
            WeaponKind::AssaultRifle => &self.assault_rifle,
            WeaponKind::SubmachineGun => &self.submachine_gun,
            WeaponKind::Pistol => &self.pistol,
            WeaponKind::SniperRifle => &self.sniper_rifle,
            WeaponKind::RocketLauncher => &self.rocket_launcher,
            WeaponKind::Minigun => &self.minigun,
        }
    }
}

impl Default for WeaponCatalog {
    fn default() -> Self {
        use WeaponKind::*;
        Self {
            assault_rifle: WeaponDefinition::new(
                "Assault Rifle", AssaultRifle, 20.0, 10.0, 30, 120, 2.0, 0.85, 2.0, 80.0,
            ),
            submachine_gun: WeaponDefinition::new(
                "Submachine Gun", SubmachineGun, 14.0, 15.0, 40, 160, 1.6, 0.75, 1.5, 45.0,
            ),
            pistol: WeaponDefinition::new(
                "Pistol", Pistol, 25.0, 4.0, 12, 48, 1.2, 0.9, 3.0, 50.0,
            ),
            sniper_rifle: WeaponDefinition::new(
                "Sniper Rifle", SniperRifle, 90.0, 0.8, 5, 20, 3.0, 0.98, 12.0, 200.0,
            ),
            rocket_launcher: WeaponDefinition::new(
                "Rocket Launcher", RocketLauncher, 120.0, 0.6, 1, 6, 3.5, 0.9, 15.0, 100.0,
            ),
            minigun: WeaponDefinition::new(
                "Minigun", Minigun, 12.0, 20.0, 100, 300, 4.0, 0.65, 1.0, 60.0,
            ),
        }
    }
}

/// Weapons carried by each class, slot 0 first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadoutTable {
    pub light: Vec<WeaponKind>,
    pub medium: Vec<WeaponKind>,
    pub heavy: Vec<WeaponKind>,
}

impl LoadoutTable {
    pub fn loadout(&self, class: MechaClass) -> &[WeaponKind] {
        match class {
            MechaClass::Light => &self.light,
            MechaClass::Medium => &self.medium,
            MechaClass::Heavy => &self.heavy,
        }
    }
}

impl Default for LoadoutTable {
    fn default() -> Self {
        Self {
            light: vec![WeaponKind::SubmachineGun, WeaponKind::Pistol],
            medium: vec![WeaponKind::AssaultRifle, WeaponKind::SniperRifle],
            heavy: vec![WeaponKind::Minigun, WeaponKind::RocketLauncher],
        }
    }
}

/// Observable weapon phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeaponPhase {
    Idle,
    Firing,
    Reloading,
}

/// A finished reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadCompletion {
    pub weapon: WeaponKind,
    pub current_ammo: u32,
    pub reserve_ammo: u32,
}

/// Mutable state of one equipped weapon
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponSlot {
    pub kind: WeaponKind,
    pub current_ammo: u32,
    pub reserve_ammo: u32,
    /// Seconds until the next shot is allowed
    pub fire_cooldown: f32,
    /// Seconds until the running reload completes
    pub reload_remaining: f32,
    pub reloading: bool,
}

impl WeaponSlot {
    /// Full magazine plus `magazine × reserve_multiplier` in reserve
    pub fn new(def: &WeaponDefinition, reserve_multiplier: f32) -> Self {
        let reserve = (def.magazine_size as f32 * reserve_multiplier.max(0.0)).round() as u32;
        Self {
            kind: def.kind,
            current_ammo: def.magazine_size,
            reserve_ammo: reserve.min(def.max_reserve_ammo),
            fire_cooldown: 0.0,
            reload_remaining: 0.0,
            reloading: false,
        }
    }

    pub fn can_fire(&self) -> bool {
        self.current_ammo > 0 && !self.reloading && self.fire_cooldown <= 0.0
    }

    pub fn phase(&self) -> WeaponPhase {
        if self.reloading {
            WeaponPhase::Reloading
        } else if self.fire_cooldown > 0.0 {
            WeaponPhase::Firing
        } else {
            WeaponPhase::Idle
        }
    }

    /// Spend one round and restart the shot cooldown. Returns false when the
    /// weapon cannot fire.
    pub fn consume_round(&mut self, def: &WeaponDefinition) -> bool {
        if !self.can_fire() {
            return false;
        }
        self.current_ammo -= 1;
        self.fire_cooldown = def.shot_interval();
        true
    }

    /// Start a reload. No-op when already reloading, magazine full or reserve
    /// empty.
    pub fn start_reload(&mut self, def: &WeaponDefinition) -> bool {
        if self.reloading || self.current_ammo >= def.magazine_size || self.reserve_ammo == 0 {
            return false;
        }
        self.reloading = true;
        self.reload_remaining = def.reload_time.max(0.0);
        true
    }

    pub fn cancel_reload(&mut self) {
        self.reloading = false;
        self.reload_remaining = 0.0;
    }

    /// Advance the slot's countdowns by `dt`
    pub fn tick(&mut self, def: &WeaponDefinition, dt: f32) -> Option<ReloadCompletion> {
        self.fire_cooldown = (self.fire_cooldown - dt).max(0.0);

        if !self.reloading {
            return None;
        }

        self.reload_remaining -= dt;
        if self.reload_remaining > 0.0 {
            return None;
        }

        let transfer = def
            .magazine_size
            .saturating_sub(self.current_ammo)
            .min(self.reserve_ammo);
        self.current_ammo += transfer;
        self.reserve_ammo -= transfer;
        self.cancel_reload();

        Some(ReloadCompletion {
            weapon: self.kind,
            current_ammo: self.current_ammo,
            reserve_ammo: self.reserve_ammo,
        })
    }

    /// Reload progress (0-1) while reloading
    pub fn reload_progress(&self, def: &WeaponDefinition) -> Option<f32> {
        if !self.reloading {
            return None;
        }
        if def.reload_time <= 0.0 {
            return Some(1.0);
        }
        Some((1.0 - self.reload_remaining / def.reload_time).clamp(0.0, 1.0))
    }
}

/// Trigger input for one tick
#[derive(Debug, Clone, Copy, Default)]
pub struct Trigger {
    pub held: bool,
    pub pressed: bool,
}

/// A shot that left the barrel. Hit resolution happens in the combat system.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shot {
    pub weapon: WeaponKind,
    /// Recoil accumulated before this shot
    pub recoil: f32,
    /// True when this shot emptied the magazine and a reload was started
    pub auto_reload: bool,
}

/// All weapons carried by one combatant for one life
#[derive(Debug, Clone)]
pub struct WeaponState {
    loadout: Vec<WeaponKind>,
    /// Slots are created on first equip in this life
    slots: Vec<Option<WeaponSlot>>,
    active: usize,
    aiming: bool,
    recoil: f32,
}

impl WeaponState {
    /// Fresh weapons for a new life, slot 0 equipped
    pub fn new(loadout: &[WeaponKind], catalog: &WeaponCatalog, reserve_multiplier: f32) -> Self {
        let mut state = Self {
            loadout: loadout.to_vec(),
            slots: vec![None; loadout.len()],
            active: 0,
            aiming: false,
            recoil: 0.0,
        };
        state.equip(0, catalog, reserve_multiplier);
        state
    }

    pub fn loadout(&self) -> &[WeaponKind] {
        &self.loadout
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_kind(&self) -> Option<WeaponKind> {
        self.loadout.get(self.active).copied()
    }

    pub fn active_slot(&self) -> Option<&WeaponSlot> {
        self.slots.get(self.active).and_then(Option::as_ref)
    }

    pub fn slot(&self, index: usize) -> Option<&WeaponSlot> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn active_slot_mut(&mut self) -> Option<&mut WeaponSlot> {
        self.slots.get_mut(self.active).and_then(Option::as_mut)
    }

    pub fn is_aiming(&self) -> bool {
        self.aiming
    }

    pub fn set_aiming(&mut self, aiming: bool) {
        self.aiming = aiming;
    }

    pub fn recoil(&self) -> f32 {
        self.recoil
    }

    /// Switch to `index`. A weapon never equipped in this life gets a full
    /// magazine and its starting reserve. Aiming is cancelled and a reload on
    /// the holstered weapon is abandoned. Returns the new weapon when the
    /// active weapon changed.
    pub fn equip(
        &mut self,
        index: usize,
        catalog: &WeaponCatalog,
        reserve_multiplier: f32,
    ) -> Option<WeaponKind> {
        let kind = *self.loadout.get(index)?;
        let first_equip = self.slots[index].is_none();
        if index == self.active && !first_equip {
            return None;
        }

        if let Some(holstered) = self.active_slot_mut() {
            holstered.cancel_reload();
        }
        if first_equip {
            self.slots[index] = Some(WeaponSlot::new(catalog.definition(kind), reserve_multiplier));
        }
        self.active = index;
        self.aiming = false;
        Some(kind)
    }

    /// Equip the next weapon in the loadout
    pub fn cycle(&mut self, catalog: &WeaponCatalog, reserve_multiplier: f32) -> Option<WeaponKind> {
        if self.loadout.len() < 2 {
            return None;
        }
        let next = (self.active + 1) % self.loadout.len();
        self.equip(next, catalog, reserve_multiplier)
    }

    /// Try to fire the active weapon. Automatic weapons fire while the trigger
    /// is held; single-shot weapons need a fresh press.
    pub fn try_fire(&mut self, catalog: &WeaponCatalog, trigger: Trigger) -> Option<Shot> {
        let kind = self.active_kind()?;
        let wants_fire = match kind.fire_mode() {
            FireMode::Automatic => trigger.held || trigger.pressed,
            FireMode::Single => trigger.pressed,
        };
        if !wants_fire {
            return None;
        }

        let def = catalog.definition(kind);
        let recoil = self.recoil;
        let slot = self.active_slot_mut()?;
        if !slot.consume_round(def) {
            return None;
        }
        let auto_reload = slot.current_ammo == 0 && slot.start_reload(def);
        self.recoil += def.recoil;

        Some(Shot {
            weapon: kind,
            recoil,
            auto_reload,
        })
    }

    /// Reload the active weapon
    pub fn reload(&mut self, catalog: &WeaponCatalog) -> Option<WeaponKind> {
        let kind = self.active_kind()?;
        let def = catalog.definition(kind);
        let slot = self.active_slot_mut()?;
        slot.start_reload(def).then_some(kind)
    }

    /// Advance cooldowns, reloads and recoil recovery by one tick.
    /// Recoil relaxes exponentially toward zero.
    pub fn tick(
        &mut self,
        catalog: &WeaponCatalog,
        dt: f32,
        recoil_recovery_rate: f32,
    ) -> Vec<ReloadCompletion> {
        self.recoil *= (-recoil_recovery_rate.max(0.0) * dt).exp();
        if self.recoil < 1e-4 {
            self.recoil = 0.0;
        }

        self.slots
            .iter_mut()
            .flatten()
            .filter_map(|slot| {
                let def = catalog.definition(slot.kind);
                slot.tick(def, dt)
            })
            .collect()
    }
}
