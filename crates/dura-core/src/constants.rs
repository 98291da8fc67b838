//! Constantes del motor.

/// Versión lógica del formato persistido (filas de ejecución y steps).
/// Cambiarla sólo ante cambios incompatibles del esquema.
pub const ENGINE_VERSION: &str = "D1.0";

/// Primer número de step dentro de una ejecución.
pub const FIRST_STEP_NUMBER: i32 = 1;

pub const DEFAULT_MAX_RECOVERY_ATTEMPTS: i32 = 50;

/// Detalle con el que se finaliza una ejecución que superó el límite de
/// reclamaciones.
pub const MAX_RECOVERY_EXCEEDED: &str = "max recovery attempts exceeded";
