/*
 *  lib.rs
 *
 *  SkyPane - weather worth watching
 *  (c) 2025-26 SkyPane contributors
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

pub mod background;
pub mod conditions;
pub mod config;
pub mod forecast;
pub mod layout;
pub mod provider;
pub mod scheduler;
pub mod timefmt;
