//! Station tests: keys, locations, inventory and the station table
