// uir: featherweight interpreter for a small typed IR.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

use std::env::args;
use std::io::{stderr, stdin, stdout};
use std::process::exit;

use uir::driver::{self, Options};
use uir::program::Program;

fn main() {
    let (opts, argv) = Options::parse(args().skip(1).collect());

    let program: Program = serde_json::from_reader(stdin())
        .expect("couldn't parse program");

    if let Err(e) = driver::run(&program, &argv, opts, stdout(), stderr()) {
        eprintln!("error: {}", e);
        exit(2);
    }
}
